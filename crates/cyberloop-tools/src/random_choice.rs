use std::collections::BTreeMap;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::object;
use crate::{ToolError, ToolImplementation};

/// Draws `count` items uniformly with replacement.
fn pick<R: Rng + ?Sized>(options: &[String], count: usize, rng: &mut R) -> Vec<String> {
    (0..count.min(options.len()))
        .filter_map(|_| options.choose(rng).cloned())
        .collect()
}

fn count(args: &serde_json::Map<String, Value>) -> Result<usize, ToolError> {
    match args.get("count") {
        None | Some(Value::Null) => Ok(1),
        Some(value) => {
            let n = value.as_f64().ok_or_else(|| ToolError::parameter("count"))?;
            if n < 0.0 {
                return Err(ToolError::InvalidParameter(
                    "'count' must not be negative".to_string(),
                ));
            }
            // 2.7 picks two items; zero picks one.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n = n.floor() as usize;
            Ok(n.max(1))
        }
    }
}

/// Picks random items from a list supplied by the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomChoiceTool;

#[async_trait]
impl ToolImplementation for RandomChoiceTool {
    fn get_definition(&self) -> Tool {
        let properties = BTreeMap::from([
            (
                "options".to_string(),
                Property::array(
                    "Array of options to choose from",
                    Property::string("One option"),
                ),
            ),
            (
                "count".to_string(),
                Property::number("Number of items to select (default: 1)"),
            ),
        ]);

        Tool::function(
            "random_choice",
            "Make a random selection from a list of options or generate random numbers.",
            Parameters::new(properties, ["options"]),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let args = object(args)?;
        let options: Vec<String> = args
            .get("options")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::parameter("options"))?
            .iter()
            .map(|option| match option {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        if options.is_empty() {
            return Err(ToolError::InvalidParameter(
                "'options' must contain at least one item".to_string(),
            ));
        }

        let choices = pick(&options, count(args)?, &mut rand::thread_rng());
        Ok(json!({ "choices": choices, "from_options": options }))
    }
}
