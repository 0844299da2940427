//! Structured-Output Recovery
//!
//! One shared service used by every stage agent to turn model text into a
//! validated value:
//!
//! 1. Recovery ladder (`json_repair`, `position_repair`)
//! 2. Field normalization onto the canonical schema (`normalize`)
//! 3. Required top-level field check
//!
//! Shape checks that depend on the stage (chapter counts, scene counts) are
//! done by the stage itself on the typed result.

mod json_repair;
mod normalize;
mod position_repair;

pub use json_repair::{JsonRepairer, Recovered, RepairStrategy};
pub use normalize::{Renames, normalize};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{Result, ValidationError, ValidationErrorKind};

/// Result of the full recovery pipeline
#[derive(Debug, Clone)]
pub struct ProcessedResponse {
    /// Parsed, repaired and normalized JSON value
    pub value: Value,
    /// Ladder rung that produced the value
    pub strategy: RepairStrategy,
    /// Keys renamed during normalization
    pub renames: Renames,
}

impl ProcessedResponse {
    pub fn was_repaired(&self) -> bool {
        matches!(
            self.strategy,
            RepairStrategy::StructuralRepair
                | RepairStrategy::TruncationClose
                | RepairStrategy::PositionalRepair
        )
    }

    /// Deserialize the normalized value into a typed result
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.value).map_err(|e| {
            ValidationError::new(ValidationErrorKind::Format, e.to_string()).into()
        })
    }
}

/// What a stage expects back
#[derive(Debug, Clone, Default)]
pub struct OutputSpec<'a> {
    /// Preferred extraction anchor key
    pub anchor: Option<&'a str>,
    /// Required top-level fields
    pub required: &'a [&'a str],
    /// Required fields that must hold arrays
    pub arrays: &'a [&'a str],
}

/// Shared structured-output recovery service
#[derive(Debug, Clone)]
pub struct StructuredOutput {
    max_position_repairs: usize,
}

impl Default for StructuredOutput {
    fn default() -> Self {
        Self::new(crate::constants::recovery::MAX_POSITION_REPAIRS)
    }
}

impl StructuredOutput {
    pub fn new(max_position_repairs: usize) -> Self {
        Self {
            max_position_repairs,
        }
    }

    /// Recover, normalize and check required fields
    pub fn process(&self, raw: &str, spec: &OutputSpec<'_>) -> Result<ProcessedResponse> {
        let mut repairer = JsonRepairer::new().with_max_position_repairs(self.max_position_repairs);
        if let Some(anchor) = spec.anchor {
            repairer = repairer.with_anchor(anchor);
        }

        let Recovered {
            mut value,
            strategy,
        } = repairer.recover(raw)?;

        // A bare array is accepted when exactly one array field is required
        if let (Value::Array(_), [only]) = (&value, spec.arrays) {
            debug!("Wrapping bare array under '{}'", only);
            let mut wrapped = serde_json::Map::new();
            wrapped.insert((*only).to_string(), value);
            value = Value::Object(wrapped);
        }

        let renames = normalize(&mut value);
        if !renames.is_empty() {
            debug!("Normalized {} field names", renames.len());
        }

        for field in spec.required {
            match value.get(*field) {
                Some(v) if !v.is_null() => {}
                _ => {
                    warn!("Recovered output lacks required field '{}'", field);
                    return Err(ValidationError::missing_field(field).into());
                }
            }
        }
        for field in spec.arrays {
            match value.get(*field) {
                Some(Value::Array(_)) => {}
                Some(_) => {
                    return Err(ValidationError::new(
                        ValidationErrorKind::Format,
                        "expected an array",
                    )
                    .with_field(*field)
                    .into());
                }
                None => return Err(ValidationError::missing_field(field).into()),
            }
        }

        Ok(ProcessedResponse {
            value,
            strategy,
            renames,
        })
    }

    /// `process` followed by typed deserialization
    pub fn parse<T: DeserializeOwned>(&self, raw: &str, spec: &OutputSpec<'_>) -> Result<T> {
        self.process(raw, spec)?.into_typed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NovelError;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Scenes {
        scenes: Vec<Scene>,
    }

    #[derive(Debug, Deserialize)]
    struct Scene {
        number: u32,
        #[serde(default)]
        setting: String,
    }

    #[test]
    fn test_process_normalizes_then_types() {
        let raw = r#"```json
{"escenas": [{"numero": 1, "setting": "dock"}, {"sceneNumber": 2}]}
```"#;
        let spec = OutputSpec {
            anchor: Some("escenas"),
            required: &["scenes"],
            arrays: &["scenes"],
        };
        let parsed: Scenes = StructuredOutput::default().parse(raw, &spec).unwrap();
        assert_eq!(parsed.scenes.len(), 2);
        assert_eq!(parsed.scenes[0].setting, "dock");
        assert_eq!(parsed.scenes[1].number, 2);
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let spec = OutputSpec {
            required: &["outline"],
            ..Default::default()
        };
        let err = StructuredOutput::default()
            .process(r#"{"title": "x"}"#, &spec)
            .unwrap_err();
        assert!(matches!(err, NovelError::Validation(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_bare_array_wrapped() {
        let spec = OutputSpec {
            arrays: &["patches"],
            ..Default::default()
        };
        let processed = StructuredOutput::default()
            .process(r#"[{"original": "a"}]"#, &spec)
            .unwrap();
        assert!(processed.value["patches"].is_array());
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let spec = OutputSpec {
            arrays: &["scenes"],
            ..Default::default()
        };
        let err = StructuredOutput::default()
            .process(r#"{"scenes": "three of them"}"#, &spec)
            .unwrap_err();
        assert!(matches!(err, NovelError::Validation(_)));
    }
}
