//! Tool declaration, tool call and tool result types.
//!
//! A [`Tool`] is the declaration sent to the model with every completion request. A [`ToolCall`]
//! is the model's request to invoke one of those tools, and a [`ToolResult`] tracks the outcome of
//! executing it.
//!
//! Streaming providers deliver tool calls as [`ToolCallDelta`] fragments keyed by index. The
//! [`ToolCallAccumulator`] folds those fragments back into complete calls.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Describes a single property in a function parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Property {
    /// The JSON type (e.g., "string", "number", "array").
    #[serde(rename = "type")]
    pub prop_type: String,
    /// Human-readable description of this property.
    pub description: String,
    /// Allowed enum values for this property.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Schema for array items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Self>>,
    /// Nested object properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Self>>,
    /// Required fields for nested objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl Property {
    fn typed(prop_type: &str, description: impl Into<String>) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: description.into(),
            enum_values: None,
            items: None,
            properties: None,
            required: None,
        }
    }

    /// Creates a string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    /// Creates a number property.
    #[must_use]
    pub fn number(description: impl Into<String>) -> Self {
        Self::typed("number", description)
    }

    /// Creates an integer property.
    #[must_use]
    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", description)
    }

    /// Creates a string property with allowed enum values.
    #[must_use]
    pub fn string_enum(description: impl Into<String>, values: &[&str]) -> Self {
        Self {
            enum_values: Some(values.iter().map(|v| (*v).to_string()).collect()),
            ..Self::typed("string", description)
        }
    }

    /// Creates an array property whose elements match `items`.
    #[must_use]
    pub fn array(description: impl Into<String>, items: Self) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array", description)
        }
    }

    /// Creates an object property with nested properties.
    #[must_use]
    pub fn object(
        description: impl Into<String>,
        properties: BTreeMap<String, Self>,
        required: Vec<String>,
    ) -> Self {
        Self {
            properties: Some(properties),
            required: Some(required),
            ..Self::typed("object", description)
        }
    }
}

/// Defines the parameter schema for a function using JSON Schema conventions.
///
/// Properties are kept sorted so a declaration always serializes to the same bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parameters {
    /// The JSON type, always "object".
    #[serde(rename = "type")]
    pub param_type: String,
    /// Map of parameter names to their property definitions.
    pub properties: BTreeMap<String, Property>,
    /// List of required parameter names.
    pub required: Vec<String>,
}

impl Parameters {
    /// Creates a new `Parameters` with type "object".
    #[must_use]
    pub fn new<I, S>(properties: BTreeMap<String, Property>, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            param_type: "object".to_string(),
            properties,
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Fallible conversion to `serde_json::Value`.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl From<Parameters> for serde_json::Value {
    fn from(params: Parameters) -> Self {
        match serde_json::to_value(params) {
            Ok(value) => value,
            Err(e) => {
                warn!("Parameters serialization unexpectedly failed: {e}");
                Self::Null
            }
        }
    }
}

/// Describes a function that can be called by an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Function {
    /// The name of the function.
    pub name: String,
    /// Human-readable description of what the function does.
    pub description: String,
    /// JSON Schema definition of the function's parameters.
    pub parameters: serde_json::Value,
}

/// A tool declaration as sent to the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Eq)]
pub struct Tool {
    /// The type of tool (defaults to "function").
    #[serde(rename = "type")]
    #[builder(default = "function".to_string())]
    pub r#type: String,
    /// The function definition.
    pub function: Function,
}

impl Tool {
    /// Declares a function tool.
    #[must_use]
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Parameters,
    ) -> Self {
        Self {
            r#type: "function".to_string(),
            function: Function {
                name: name.into(),
                description: description.into(),
                parameters: parameters.into(),
            },
        }
    }

    /// The declared function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Represents an invocation of a function with arguments.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// The name of the function being called.
    pub name: String,
    /// The raw argument text, expected to be a JSON object.
    pub arguments: String,
}

impl FunctionCall {
    /// Returns the arguments as a JSON string slice.
    ///
    /// Returns `"{}"` if the arguments string is empty or whitespace.
    #[must_use]
    pub fn arguments_json(&self) -> &str {
        if self.arguments.trim().is_empty() {
            "{}"
        } else {
            &self.arguments
        }
    }
}

/// A complete tool call issued by the model.
///
/// Arguments in `function.arguments` are passed through as-is from the provider; they are parsed
/// only when the call is executed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// The function being invoked.
    pub function: FunctionCall,
    /// The type of call, typically "function".
    pub call_type: String,
}

impl ToolCall {
    /// Creates a new tool call with a generated ID.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::with_id(generate_call_id(), name, arguments)
    }

    /// Creates a tool call with a known ID.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            call_type: "function".to_string(),
        }
    }

    fn empty() -> Self {
        Self::with_id(String::new(), String::new(), String::new())
    }
}

fn generate_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// A fragment of a tool call delivered by a streaming response.
///
/// Providers may split one logical call across any number of fragments. Fragments that belong
/// to the same call share an `index`; `id` normally arrives only on the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call within the assistant turn.
    pub index: u32,
    /// Call identifier, when present in this fragment.
    pub id: Option<String>,
    /// Function name fragment.
    pub name: Option<String>,
    /// Argument text fragment.
    pub arguments: Option<String>,
}

/// Folds streamed [`ToolCallDelta`] fragments into complete [`ToolCall`]s.
///
/// Names and argument text are concatenated in arrival order per index. An id replaces any
/// previous id for the same index. [`finish`](Self::finish) returns the calls in index order.
#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, ToolCall>,
}

impl ToolCallAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one fragment.
    pub fn push(&mut self, delta: &ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_insert_with(ToolCall::empty);

        if let Some(id) = delta.id.as_deref()
            && !id.is_empty()
        {
            id.clone_into(&mut call.id);
        }
        if let Some(name) = delta.name.as_deref() {
            call.function.name.push_str(name);
        }
        if let Some(arguments) = delta.arguments.as_deref() {
            call.function.arguments.push_str(arguments);
        }
    }

    /// Merges every fragment in `deltas`.
    pub fn extend<'a>(&mut self, deltas: impl IntoIterator<Item = &'a ToolCallDelta>) {
        for delta in deltas {
            self.push(delta);
        }
    }

    /// Number of distinct calls seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no fragment has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completes accumulation, returning calls in index order.
    ///
    /// Calls whose id never arrived get a generated one so that tool results can always be
    /// matched to their request.
    #[must_use]
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = generate_call_id();
                    warn!(
                        "Tool call '{}' arrived without an id, assigned {}",
                        call.function.name, call.id
                    );
                }
                call
            })
            .collect()
    }
}

/// Lifecycle status of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// The call was recognized and has not finished yet.
    Pending,
    /// The tool returned a result.
    Success,
    /// The tool failed; the payload is a structured error object.
    Error,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Rejected [`ToolResult`] transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolResultError {
    /// The result was already resolved.
    #[error("tool result for '{id}' already resolved as {status}")]
    AlreadyResolved {
        /// Tool call id.
        id: String,
        /// Status the result already holds.
        status: ToolStatus,
    },
    /// A result can only be resolved to success or error.
    #[error("tool result cannot transition back to pending")]
    BackToPending,
}

/// Outcome of one tool call.
///
/// Starts [`ToolStatus::Pending`] and is resolved exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the [`ToolCall`] this result answers.
    pub tool_call_id: String,
    /// Current status.
    pub status: ToolStatus,
    /// Serialized result, present once resolved.
    pub payload: Option<String>,
    /// Time of the last transition.
    pub timestamp: DateTime<Utc>,
}

impl ToolResult {
    /// Creates a pending result for `tool_call_id`.
    pub fn pending(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolStatus::Pending,
            payload: None,
            timestamp: Utc::now(),
        }
    }

    /// Resolves a pending result.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is already resolved or if `status` is pending.
    pub fn resolve(
        &mut self,
        status: ToolStatus,
        payload: impl Into<String>,
    ) -> Result<(), ToolResultError> {
        if self.status != ToolStatus::Pending {
            return Err(ToolResultError::AlreadyResolved {
                id: self.tool_call_id.clone(),
                status: self.status,
            });
        }
        if status == ToolStatus::Pending {
            return Err(ToolResultError::BackToPending);
        }
        self.status = status;
        self.payload = Some(payload.into());
        self.timestamp = Utc::now();
        Ok(())
    }

    /// Whether the result has reached a terminal status.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status != ToolStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.map(String::from),
        }
    }

    #[test]
    fn test_property_serialization_omits_empty_fields() {
        let prop = Property::number("Value to convert");

        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["description"], "Value to convert");
        assert!(json.get("enum").is_none());
        assert!(json.get("items").is_none());
        assert!(json.get("properties").is_none());
    }

    #[test]
    fn test_property_string_enum() {
        let prop = Property::string_enum("Operation", &["encode", "decode"]);

        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json["enum"], serde_json::json!(["encode", "decode"]));
    }

    #[test]
    fn test_property_array_of_strings() {
        let prop = Property::array("Options", Property::string("One option"));

        let json = serde_json::to_value(&prop).unwrap();
        assert_eq!(json["type"], "array");
        assert_eq!(json["items"]["type"], "string");
    }

    #[test]
    fn test_parameters_serialize_in_stable_order() {
        let mut properties = BTreeMap::new();
        properties.insert("zeta".to_string(), Property::string("z"));
        properties.insert("alpha".to_string(), Property::string("a"));
        let params = Parameters::new(properties, ["alpha"]);

        let first = serde_json::to_string(&params).unwrap();
        let second = serde_json::to_string(&params.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.find("alpha").unwrap() < first.find("zeta").unwrap());
    }

    #[test]
    fn test_tool_function_constructor() {
        let tool = Tool::function("date", "Date operations", Parameters::new(BTreeMap::new(), Vec::<String>::new()));

        assert_eq!(tool.r#type, "function");
        assert_eq!(tool.name(), "date");
        assert_eq!(tool.function.parameters["type"], "object");
    }

    #[test]
    fn test_arguments_json_defaults_to_empty_object() {
        let call = ToolCall::new("date", "  ");
        assert_eq!(call.function.arguments_json(), "{}");

        let call = ToolCall::new("date", r#"{"operation":"now"}"#);
        assert_eq!(call.function.arguments_json(), r#"{"operation":"now"}"#);
    }

    #[test]
    fn test_tool_call_new_generates_prefixed_id() {
        let call = ToolCall::new("fetch", "{}");
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.call_type, "function");
    }

    #[test]
    fn test_accumulator_concatenates_fragments_per_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(0, Some("call_a"), Some("web_"), Some("{\"qu")));
        acc.push(&delta(1, Some("call_b"), Some("date"), None));
        acc.push(&delta(0, None, Some("search"), Some("ery\":\"rust\"}")));
        acc.push(&delta(1, None, None, Some("{\"operation\":\"now\"}")));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "web_search");
        assert_eq!(calls[0].function.arguments, r#"{"query":"rust"}"#);
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].function.name, "date");
    }

    #[test]
    fn test_accumulator_orders_by_index_not_arrival() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(2, Some("c"), Some("memory"), Some("{}")));
        acc.push(&delta(0, Some("a"), Some("fetch"), Some("{}")));

        let ids: Vec<_> = acc.finish().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_accumulator_assigns_missing_ids() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(0, None, Some("convert"), Some("{}")));
        acc.push(&delta(0, Some(""), None, None));

        let calls = acc.finish();
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_tool_result_resolves_once() {
        let mut result = ToolResult::pending("call_1");
        assert!(!result.is_resolved());

        result.resolve(ToolStatus::Success, "{\"ok\":true}").unwrap();
        assert!(result.is_resolved());
        assert_eq!(result.payload.as_deref(), Some("{\"ok\":true}"));

        let err = result.resolve(ToolStatus::Error, "{}").unwrap_err();
        assert!(matches!(err, ToolResultError::AlreadyResolved { status: ToolStatus::Success, .. }));
    }

    #[test]
    fn test_tool_result_rejects_pending_target() {
        let mut result = ToolResult::pending("call_1");
        assert_eq!(
            result.resolve(ToolStatus::Pending, ""),
            Err(ToolResultError::BackToPending)
        );
        assert_eq!(result.status, ToolStatus::Pending);
    }

    #[test]
    fn test_tool_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ToolStatus::Error).unwrap(), "\"error\"");
        assert_eq!(ToolStatus::Success.to_string(), "success");
    }
}

#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;

    /// Splits `text` at the given char boundaries.
    fn split_chars(text: &str, mut cuts: Vec<usize>) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        cuts.retain(|c| *c > 0 && *c < chars.len());
        cuts.sort_unstable();
        cuts.dedup();

        let mut pieces = Vec::new();
        let mut start = 0;
        for cut in cuts {
            pieces.push(chars[start..cut].iter().collect());
            start = cut;
        }
        pieces.push(chars[start..].iter().collect());
        pieces
    }

    proptest! {
        #[test]
        fn fragmented_calls_match_single_delivery(
            id in "call_[a-z0-9]{4,12}",
            name in "[a-z_]{1,16}",
            arguments in "\\{\"[a-z]{1,8}\": ?\"[^\"\\\\]{0,24}\"\\}",
            name_cuts in prop::collection::vec(0usize..16, 0..4),
            arg_cuts in prop::collection::vec(0usize..40, 0..8),
        ) {
            let mut whole = ToolCallAccumulator::new();
            whole.push(&ToolCallDelta {
                index: 0,
                id: Some(id.clone()),
                name: Some(name.clone()),
                arguments: Some(arguments.clone()),
            });

            let mut fragmented = ToolCallAccumulator::new();
            fragmented.push(&ToolCallDelta { index: 0, id: Some(id), ..ToolCallDelta::default() });
            for piece in split_chars(&name, name_cuts) {
                fragmented.push(&ToolCallDelta { index: 0, name: Some(piece), ..ToolCallDelta::default() });
            }
            for piece in split_chars(&arguments, arg_cuts) {
                fragmented.push(&ToolCallDelta { index: 0, arguments: Some(piece), ..ToolCallDelta::default() });
            }

            prop_assert_eq!(whole.finish(), fragmented.finish());
        }

        #[test]
        fn interleaved_indices_stay_separate(
            first in "[a-z]{1,20}",
            second in "[a-z]{1,20}",
        ) {
            let mut acc = ToolCallAccumulator::new();
            for (a, b) in first.chars().zip(second.chars()) {
                acc.push(&ToolCallDelta { index: 0, arguments: Some(a.to_string()), ..ToolCallDelta::default() });
                acc.push(&ToolCallDelta { index: 1, arguments: Some(b.to_string()), ..ToolCallDelta::default() });
            }
            let n = first.chars().count().min(second.chars().count());
            let calls = acc.finish();
            prop_assert_eq!(&calls[0].function.arguments, &first.chars().take(n).collect::<String>());
            prop_assert_eq!(&calls[1].function.arguments, &second.chars().take(n).collect::<String>());
        }
    }
}
