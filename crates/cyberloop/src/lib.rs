//! # cyberloop
//!
//! Drives a tool-calling conversation with an OpenAI-compatible chat endpoint until the model
//! produces a final answer.
//!
//! [`Core`] sends the history and the tool declarations, streams the reply, runs whatever tools
//! the model asked for, appends their results and goes again, up to an iteration ceiling.
//! Progress is reported through [`CoreEvent`]s as it happens.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cyberloop::{Config, Core, CoreEvent, OpenAIClient, ToolExecutor, ToolRegistry, ToolsConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("moonshot", "kimi-k2-turbo-preview")
//!     .with_base_url("https://api.moonshot.ai/v1")
//!     .with_api_key("sk-...");
//! let client = OpenAIClient::new(config)?;
//! let registry = ToolRegistry::builtin(&ToolsConfig::default())?;
//!
//! let core = Core::new(client, ToolExecutor::new(registry)).with_max_iterations(5);
//! let answer = core
//!     .run("How many miles is 42 km?", |event| {
//!         if let CoreEvent::Content(text) = event {
//!             print!("{text}");
//!         }
//!     })
//!     .await?;
//! println!("\n{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! The lower layers are re-exported: message and request types from `cyberloop-common`, the
//! endpoint client from `cyberloop-client` and the tool registry from `cyberloop-tools`.

pub mod core;
pub mod error;
pub mod events;
pub mod fallback;
pub mod metrics;

pub use cyberloop_client::*;
pub use cyberloop_common::*;
pub use cyberloop_tools::*;

pub use crate::core::{Core, DEFAULT_MAX_ITERATIONS, NO_RESPONSE, RunOutcome};
pub use error::CoreError;
pub use events::{CoreEvent, ToolCallUpdate};
pub use fallback::{FallbackStrategy, ModelFallback};
pub use metrics::{Metrics, MetricsSnapshot};
