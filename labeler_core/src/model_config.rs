//! Model configuration validation.
//!
//! Each model family declares the shape of the configuration an agent may
//! carry. A family with declared properties rejects unknown fields; a family
//! with an empty schema (or an unknown family) accepts anything.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::{CoreError, CoreResult};

/// Family used when none is named.
pub const DEFAULT_MODEL_FAMILY: &str = "completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl JsonType {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Allowed {
    Strings(&'static [&'static str]),
    Integers(&'static [i64]),
}

impl Allowed {
    fn contains(self, value: &Value) -> bool {
        match self {
            Allowed::Strings(list) => value.as_str().is_some_and(|s| list.contains(&s)),
            Allowed::Integers(list) => value.as_i64().is_some_and(|n| list.contains(&n)),
        }
    }
}

#[derive(Debug, Clone)]
struct PropertyRule {
    types: &'static [JsonType],
    allowed: Option<Allowed>,
    minimum: Option<f64>,
    maximum: Option<f64>,
}

impl PropertyRule {
    fn of(types: &'static [JsonType]) -> Self {
        Self {
            types,
            allowed: None,
            minimum: None,
            maximum: None,
        }
    }

    fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    fn one_of(mut self, allowed: Allowed) -> Self {
        self.allowed = Some(allowed);
        self
    }

    fn check(&self, field: &str, value: &Value, errors: &mut Vec<String>) {
        if !self.types.iter().any(|t| t.matches(value)) {
            let expected: Vec<&str> = self.types.iter().map(|t| t.name()).collect();
            errors.push(format!("{}: expected {}, got {}", field, expected.join(" or "), value));
            return;
        }
        if let Some(allowed) = self.allowed {
            if !allowed.contains(value) {
                errors.push(format!("{}: {} is not an allowed value", field, value));
            }
        }
        if let Some(n) = value.as_f64() {
            if self.minimum.is_some_and(|min| n < min) || self.maximum.is_some_and(|max| n > max) {
                errors.push(format!(
                    "{}: {} is outside [{}, {}]",
                    field,
                    n,
                    self.minimum.map_or("-inf".to_string(), |v| v.to_string()),
                    self.maximum.map_or("inf".to_string(), |v| v.to_string()),
                ));
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FamilySchema {
    required: &'static [&'static str],
    properties: Vec<(&'static str, PropertyRule)>,
}

const COMPLETION_MODELS: &[&str] = &[
    "text-davinci-003",
    "text-davinci-002",
    "text-davinci-001",
    "text-curie-001",
    "text-babbage-001",
    "text-ada-001",
    "davinci",
    "curie",
    "babbage",
    "ada",
];

static MODEL_FAMILIES: Lazy<HashMap<&'static str, FamilySchema>> = Lazy::new(|| {
    use JsonType::*;
    let penalty = PropertyRule::of(&[Number]).range(Some(-2.0), Some(2.0));

    let completions = FamilySchema {
        required: &["model"],
        properties: vec![
            ("model", PropertyRule::of(&[String]).one_of(Allowed::Strings(COMPLETION_MODELS))),
            ("temperature", PropertyRule::of(&[Number]).range(Some(0.0), Some(2.0))),
            ("suffix", PropertyRule::of(&[String])),
            ("max_tokens", PropertyRule::of(&[Integer])),
            ("top_p", PropertyRule::of(&[Number])),
            ("n", PropertyRule::of(&[Integer]).one_of(Allowed::Integers(&[1]))),
            ("stream", PropertyRule::of(&[Boolean])),
            ("logprobs", PropertyRule::of(&[Integer]).range(None, Some(5.0))),
            ("echo", PropertyRule::of(&[Boolean])),
            ("stop", PropertyRule::of(&[Array, String])),
            ("presence_penalty", penalty.clone()),
            ("frequency_penalty", penalty),
            ("best_of", PropertyRule::of(&[Integer])),
            ("logit_bias", PropertyRule::of(&[Object])),
            ("user", PropertyRule::of(&[String])),
        ],
    };

    let mut families = HashMap::new();
    families.insert("completions", completions);
    families.insert("chat", FamilySchema::default());
    families
});

/// Names of the families with a declared schema.
pub fn known_model_families() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = MODEL_FAMILIES.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Outcome of validating one model configuration.
#[derive(Debug, Clone, Default)]
pub struct ModelConfigValidationResult {
    pub errors: Vec<String>,
}

impl ModelConfigValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> CoreResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CoreError::validation(format!(
                "invalid model config: {}",
                self.errors.join("; ")
            )))
        }
    }
}

/// Check `config` against a family's schema, collecting every problem.
pub fn check_model_config(family: &str, config: &Value) -> ModelConfigValidationResult {
    let mut result = ModelConfigValidationResult::default();
    let Some(schema) = MODEL_FAMILIES.get(family) else {
        return result;
    };
    if schema.properties.is_empty() && schema.required.is_empty() {
        return result;
    }
    let Some(map) = config.as_object() else {
        result.errors.push(format!("model config must be an object, got {}", config));
        return result;
    };

    for field in schema.required {
        if !map.contains_key(*field) {
            result.errors.push(format!("{}: required field is missing", field));
        }
    }
    for (field, value) in map {
        match schema.properties.iter().find(|(name, _)| *name == field.as_str()) {
            Some((_, rule)) => rule.check(field, value, &mut result.errors),
            None => result.errors.push(format!("{}: unknown field", field)),
        }
    }
    result
}

/// Validate `config` for a model family.
pub fn validate_model_config_for(family: &str, config: &Value) -> CoreResult<()> {
    check_model_config(family, config).into_result()
}

/// Validate `config` for the default (`completions`) family.
pub fn validate_model_config(config: &Value) -> CoreResult<()> {
    validate_model_config_for(DEFAULT_MODEL_FAMILY, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_completions_config() {
        let config = json!({"model": "text-davinci-003", "temperature": 0.7});
        assert!(validate_model_config(&config).is_ok());
        assert!(validate_model_config(&json!({"model": "ada", "stop": ["\n"], "n": 1})).is_ok());
        assert!(validate_model_config(&json!({"model": "ada", "stop": "\n"})).is_ok());
    }

    #[test]
    fn test_missing_model_fails() {
        let err = validate_model_config(&json!({"temperature": 0.7})).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_out_of_range_temperature_fails() {
        let config = json!({"model": "ada", "temperature": 3.5});
        let result = check_model_config("completions", &config);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("temperature"));
    }

    #[test]
    fn test_every_offending_field_is_listed() {
        let result = check_model_config(
            "completions",
            &json!({"model": "gpt-99", "n": 2, "logprobs": 9, "colour": "red", "echo": "yes"}),
        );
        let fields: Vec<&str> = result
            .errors
            .iter()
            .map(|e| e.split(':').next().unwrap())
            .collect();
        for f in ["model", "n", "logprobs", "colour", "echo"] {
            assert!(fields.contains(&f), "missing {f} in {:?}", result.errors);
        }
    }

    #[test]
    fn test_chat_and_unknown_families_are_permissive() {
        let config = json!({"model": "gpt-4o", "anything": true});
        assert!(validate_model_config_for("chat", &config).is_ok());
        assert!(validate_model_config_for("embeddings", &json!("not even an object")).is_ok());
        assert_eq!(known_model_families(), vec!["chat", "completions"]);
    }
}
