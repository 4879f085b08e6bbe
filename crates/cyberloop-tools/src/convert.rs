use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Value, json};

use cyberloop_common::tools::{Parameters, Property, Tool};

use crate::args::{object, required_str};
use crate::{ToolError, ToolImplementation};

type Conversion = (&'static str, &'static str, fn(f64) -> f64);

const CONVERSIONS: &[Conversion] = &[
    ("celsius", "fahrenheit", |v| v * 9.0 / 5.0 + 32.0),
    ("celsius", "kelvin", |v| v + 273.15),
    ("fahrenheit", "celsius", |v| (v - 32.0) * 5.0 / 9.0),
    ("fahrenheit", "kelvin", |v| (v - 32.0) * 5.0 / 9.0 + 273.15),
    ("miles", "km", |v| v * 1.60934),
    ("miles", "meters", |v| v * 1609.34),
    ("km", "miles", |v| v / 1.60934),
    ("km", "meters", |v| v * 1000.0),
    ("kg", "lbs", |v| v * 2.20462),
    ("kg", "grams", |v| v * 1000.0),
    ("lbs", "kg", |v| v / 2.20462),
    ("lbs", "grams", |v| v * 453.592),
];

/// Source units in table order, without duplicates.
fn supported_units() -> Vec<String> {
    let mut units: Vec<String> = Vec::new();
    for (from, _, _) in CONVERSIONS {
        if !units.iter().any(|u| u == from) {
            units.push((*from).to_string());
        }
    }
    units
}

fn convert(value: f64, from: &str, to: &str) -> Option<f64> {
    let from = from.to_lowercase();
    let to = to.to_lowercase();
    CONVERSIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, apply)| apply(value))
}

/// Converts between temperature, distance and weight units.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertTool;

#[async_trait]
impl ToolImplementation for ConvertTool {
    fn get_definition(&self) -> Tool {
        let properties = BTreeMap::from([
            (
                "value".to_string(),
                Property::number("The numeric value to convert"),
            ),
            (
                "from_unit".to_string(),
                Property::string("The source unit (e.g., \"celsius\", \"miles\", \"kg\")"),
            ),
            (
                "to_unit".to_string(),
                Property::string("The target unit (e.g., \"fahrenheit\", \"km\", \"lbs\")"),
            ),
        ]);

        Tool::function(
            "convert",
            "Convert between different units of measurement (temperature, distance, weight, \
             time, etc.)",
            Parameters::new(properties, ["value", "from_unit", "to_unit"]),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let args = object(args)?;
        let value = args
            .get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::parameter("value"))?;
        let from_unit = required_str(args, "from_unit")?;
        let to_unit = required_str(args, "to_unit")?;

        let result = convert(value, from_unit, to_unit).ok_or_else(|| ToolError::Unsupported {
            message: format!("Conversion from {from_unit} to {to_unit} not supported"),
            supported: supported_units(),
        })?;

        Ok(json!({
            "original": format!("{value} {from_unit}"),
            "converted": format!("{result:.2} {to_unit}"),
            "value": result,
        }))
    }
}
