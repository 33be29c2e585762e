//! Declarative object schemas for structured-output calls.
//!
//! An [`ObjectSchema`] names the fields a structured call must return, their
//! types and ranges, and which of them are scoring dimensions. Clients map
//! it onto their provider's structured-output feature; the judge builds one
//! per active dimension set.

use serde::{Deserialize, Serialize};

/// Field type within an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// A number constrained to `[min, max]`.
    Number { min: f64, max: f64 },
    /// Free-form text.
    Text,
}

/// A single required field of a structured output object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
    /// Whether this field is a scoring dimension.
    pub is_dimension: bool,
}

impl FieldSpec {
    /// A `[0, 1]` numeric dimension field.
    pub fn dimension(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: FieldKind::Number { min: 0.0, max: 1.0 },
            is_dimension: true,
        }
    }

    /// A free-form text field.
    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: FieldKind::Text,
            is_dimension: false,
        }
    }
}

/// Description of a structured output object: every field is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Names of the dimension fields, in declaration order.
    pub fn dimension_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.is_dimension)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Renders the schema as a JSON Schema object for providers that accept
    /// one.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let spec = match &field.kind {
                FieldKind::Number { min, max } => serde_json::json!({
                    "type": "number",
                    "minimum": min,
                    "maximum": max,
                    "description": field.description,
                }),
                FieldKind::Text => serde_json::json!({
                    "type": "string",
                    "description": field.description,
                }),
            };
            properties.insert(field.name.clone(), spec);
            required.push(serde_json::Value::String(field.name.clone()));
        }

        serde_json::json!({
            "type": "object",
            "title": self.name,
            "description": self.description,
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Renders a plain-text field listing for providers that only support
    /// free-form JSON mode.
    pub fn to_instruction(&self) -> String {
        let mut lines = vec![format!(
            "Respond with a single JSON object containing exactly these fields:"
        )];
        for field in &self.fields {
            let kind = match &field.kind {
                FieldKind::Number { min, max } => format!("number between {min} and {max}"),
                FieldKind::Text => "string".to_string(),
            };
            lines.push(format!(
                "- \"{}\" ({}): {}",
                field.name, kind, field.description
            ));
        }
        lines.push("Output only the JSON object, no other text.".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judge_schema() -> ObjectSchema {
        ObjectSchema::new("judgment", "Per-dimension scores plus feedback")
            .with_field(FieldSpec::dimension("accuracy", "Factual correctness"))
            .with_field(FieldSpec::dimension("tone", "Appropriate register"))
            .with_field(FieldSpec::text("detailed_feedback", "What went wrong"))
    }

    #[test]
    fn test_dimension_names() {
        let schema = judge_schema();
        assert_eq!(schema.dimension_names(), vec!["accuracy", "tone"]);
    }

    #[test]
    fn test_to_json_schema() {
        let json = judge_schema().to_json_schema();

        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["accuracy"]["type"], "number");
        assert_eq!(json["properties"]["accuracy"]["maximum"], 1.0);
        assert_eq!(json["properties"]["detailed_feedback"]["type"], "string");

        let required = json["required"].as_array().expect("required array");
        assert_eq!(required.len(), 3);
    }

    #[test]
    fn test_to_instruction_lists_fields() {
        let instruction = judge_schema().to_instruction();
        assert!(instruction.contains("\"accuracy\" (number between 0 and 1)"));
        assert!(instruction.contains("\"detailed_feedback\" (string)"));
        assert!(instruction.contains("Output only the JSON object"));
    }
}
