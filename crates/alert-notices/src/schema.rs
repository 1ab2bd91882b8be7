use std::path::Path;

use notice_common::openai::{FunctionDefinition, Tool, ToolChoice};
use serde_json::Value;

use crate::error::AppError;

pub const DEFAULT_SCHEMA_PATH: &str = "schema/output_format.json";

/// Shape of the record the model must return, expressed as a function
/// definition (`name`, `description`, JSON Schema `parameters`).
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    function: FunctionDefinition,
}

impl ExtractionSchema {
    pub fn from_definition(function: FunctionDefinition) -> Result<Self, AppError> {
        if function.name.trim().is_empty() {
            return Err(AppError::Schema("function name must not be empty".to_string()));
        }
        match function.parameters.get("type").and_then(Value::as_str) {
            Some("object") => {}
            other => {
                return Err(AppError::Schema(format!(
                    "parameters must be an object schema, got type {other:?}"
                )))
            }
        }
        Ok(Self { function })
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let function: FunctionDefinition = serde_json::from_str(raw)
            .map_err(|e| AppError::Schema(format!("invalid schema document: {e}")))?;
        Self::from_definition(function)
    }

    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Schema(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Field names declared under `parameters.properties`.
    pub fn field_names(&self) -> Vec<&str> {
        self.function
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn tool(&self) -> Tool {
        Tool::function(self.function.clone())
    }

    pub fn tool_choice(&self) -> ToolChoice {
        ToolChoice::function(self.function.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_schema_is_valid() {
        let raw = include_str!("../../../schema/output_format.json");
        let schema = ExtractionSchema::parse(raw).expect("bundled schema parses");
        let fields = schema.field_names();
        for expected in [
            "Title",
            "Principal Investigator",
            "Abstract",
            "Justification",
            "Target Object",
            "Start Date",
            "End Date",
            "Status",
        ] {
            assert!(fields.contains(&expected), "missing field {expected}");
        }
    }

    #[test]
    fn rejects_non_object_parameters() {
        let err = ExtractionSchema::parse(r#"{"name": "x", "parameters": {"type": "string"}}"#)
            .expect_err("string schema rejected");
        assert!(matches!(err, AppError::Schema(_)));
    }

    #[test]
    fn rejects_missing_name() {
        assert!(ExtractionSchema::parse(r#"{"parameters": {"type": "object"}}"#).is_err());
    }

    #[test]
    fn tool_choice_names_the_function() {
        let schema = ExtractionSchema::parse(
            r#"{"name": "record_campaign", "parameters": {"type": "object", "properties": {}}}"#,
        )
        .unwrap();
        assert_eq!(schema.name(), "record_campaign");
        assert_eq!(schema.tool_choice().function.name, "record_campaign");
        assert_eq!(schema.tool().kind, "function");
    }
}
