//! Switching to another model when the current one fails.

use std::collections::HashSet;

use cyberloop_client::{ClientError, ErrorKind};

/// Decides whether a failed completion request should be retried on another model.
///
/// The driver consults the strategy at most once per run, and only for failures raised before
/// the response started streaming.
pub trait FallbackStrategy: Send + Sync {
    /// Model to switch to after `failed_model` returned `error`, or `None` to give up.
    fn fallback_model(&self, failed_model: &str, error: &ClientError) -> Option<String>;
}

/// Falls back to one alternate model for a chosen set of error kinds.
///
/// ```
/// use cyberloop::fallback::{FallbackStrategy, ModelFallback};
/// use cyberloop::ClientError;
///
/// let fallback = ModelFallback::new("moonshot-v1-32k");
/// let overloaded = ClientError::Overloaded("busy".to_string());
///
/// assert_eq!(
///     fallback.fallback_model("kimi-k2-turbo-preview", &overloaded),
///     Some("moonshot-v1-32k".to_string())
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ModelFallback {
    model: String,
    kinds: HashSet<ErrorKind>,
}

impl ModelFallback {
    /// Falls back to `model` when the provider is overloaded or unavailable.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            kinds: HashSet::from([ErrorKind::Overloaded, ErrorKind::ServiceUnavailable]),
        }
    }

    /// Replaces the error kinds that trigger the fallback.
    #[must_use]
    pub fn on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl FallbackStrategy for ModelFallback {
    fn fallback_model(&self, failed_model: &str, error: &ClientError) -> Option<String> {
        (failed_model != self.model && self.kinds.contains(&error.kind()))
            .then(|| self.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_kinds() {
        let fallback = ModelFallback::new("backup");

        assert_eq!(
            fallback.fallback_model("main", &ClientError::ServiceUnavailable("down".into())),
            Some("backup".to_string())
        );
        assert_eq!(
            fallback.fallback_model("main", &ClientError::AuthenticationError("bad key".into())),
            None
        );
        assert_eq!(
            fallback.fallback_model(
                "main",
                &ClientError::RateLimitError {
                    retry_after: Some(Duration::from_secs(1))
                }
            ),
            None
        );
    }

    #[test]
    fn test_custom_kinds() {
        let fallback = ModelFallback::new("backup").on([ErrorKind::RateLimited]);
        let limited = ClientError::RateLimitError { retry_after: None };

        assert_eq!(fallback.fallback_model("main", &limited), Some("backup".to_string()));
        assert_eq!(
            fallback.fallback_model("main", &ClientError::Overloaded("busy".into())),
            None
        );
    }

    #[test]
    fn test_never_falls_back_to_the_failing_model() {
        let fallback = ModelFallback::new("backup");
        assert_eq!(
            fallback.fallback_model("backup", &ClientError::Overloaded("busy".into())),
            None
        );
    }
}
