//! Prompt templates for LLM labeling.
//!
//! A template is plain text with three placeholders:
//! - `{label_name}`: the label being assigned
//! - `{label_options}`: the allowed values from the label schema
//! - `{input}`: the record content
//!
//! The model is expected to answer `"{label_name}: <value>"`.

use labeler_core_types::{LabelOption, LabelSchemaEntry};

use crate::errors::{CoreError, CoreResult};

pub const DEFAULT_TEMPLATE: &str = "Label the input with its {label_name}.\n\
Answer with exactly one of the following options: {label_options}.\n\
\n\
Input: {input}\n\
{label_name}:";

/// A template bound to a label schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    label_schema: Vec<LabelSchemaEntry>,
    label_names: Vec<String>,
    template: String,
}

impl PromptTemplate {
    /// Bind `template` (or the default one) to `label_names` in a schema.
    ///
    /// Every label name must exist in the schema.
    pub fn new(
        label_schema: Vec<LabelSchemaEntry>,
        label_names: Vec<String>,
        template: Option<String>,
    ) -> CoreResult<Self> {
        if label_names.is_empty() {
            return Err(CoreError::validation("at least one label name is required"));
        }
        for name in &label_names {
            if !label_schema.iter().any(|entry| &entry.name == name) {
                return Err(CoreError::validation(format!(
                    "label name '{}' is not in the label schema",
                    name
                )));
            }
        }
        let template = template
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        Ok(Self {
            label_schema,
            label_names,
            template,
        })
    }

    /// Raw template text, as stored with an agent.
    pub fn get_template(&self) -> &str {
        &self.template
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    fn target(&self) -> CoreResult<&LabelSchemaEntry> {
        let name = self
            .label_names
            .first()
            .ok_or_else(|| CoreError::validation("at least one label name is required"))?;
        self.label_schema
            .iter()
            .find(|entry| &entry.name == name)
            .ok_or_else(|| {
                CoreError::validation(format!("label name '{}' is not in the label schema", name))
            })
    }

    /// Render the prompt for one record.
    pub fn build_prompt(&self, input: &str) -> CoreResult<String> {
        let entry = self.target()?;
        let options = entry
            .options
            .iter()
            .map(describe_option)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(self
            .template
            .replace("{label_name}", &entry.name)
            .replace("{label_options}", &options)
            .replace("{input}", input))
    }

    /// Extract the label value from a model answer.
    ///
    /// Accepts `"<label_name>: <value>"` or a bare value; option display
    /// text maps back to its value. The error names what was rejected.
    pub fn parse_response(&self, text: &str) -> Result<String, String> {
        let entry = self.target().map_err(|e| e.to_string())?;
        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| "empty response".to_string())?;

        let answer = match line.split_once(':') {
            Some((prefix, rest)) if prefix.trim().eq_ignore_ascii_case(&entry.name) => rest,
            _ => line,
        };
        let answer = answer
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
            .trim();

        entry
            .options
            .iter()
            .find(|o| o.value.eq_ignore_ascii_case(answer))
            .or_else(|| {
                entry
                    .options
                    .iter()
                    .find(|o| !o.text.is_empty() && o.text.eq_ignore_ascii_case(answer))
            })
            .map(|o| o.value.clone())
            .ok_or_else(|| format!("'{}' is not a valid option for {}", answer, entry.name))
    }
}

fn describe_option(option: &LabelOption) -> String {
    if option.text.is_empty() || option.text == option.value {
        option.value.clone()
    } else {
        format!("{} ({})", option.value, option.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<LabelSchemaEntry> {
        vec![LabelSchemaEntry {
            name: "sentiment".to_string(),
            level: "record".to_string(),
            options: vec![
                LabelOption {
                    value: "pos".to_string(),
                    text: "positive".to_string(),
                },
                LabelOption {
                    value: "neg".to_string(),
                    text: "negative".to_string(),
                },
            ],
        }]
    }

    fn template() -> PromptTemplate {
        PromptTemplate::new(schema(), vec!["sentiment".to_string()], None).unwrap()
    }

    #[test]
    fn test_unknown_label_name_is_rejected() {
        let err = PromptTemplate::new(schema(), vec!["topic".to_string()], None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_build_prompt_fills_placeholders() {
        let prompt = template().build_prompt("Flight was late again").unwrap();
        assert!(prompt.contains("pos (positive), neg (negative)"));
        assert!(prompt.contains("Input: Flight was late again"));
        assert!(prompt.ends_with("sentiment:"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_custom_template_is_kept_verbatim() {
        let t = PromptTemplate::new(
            schema(),
            vec!["sentiment".to_string()],
            Some("{input} => {label_name}".to_string()),
        )
        .unwrap();
        assert_eq!(t.get_template(), "{input} => {label_name}");
        assert_eq!(t.build_prompt("hi").unwrap(), "hi => sentiment");
    }

    #[test]
    fn test_parse_response() {
        let t = template();
        assert_eq!(t.parse_response(" sentiment: pos\n"), Ok("pos".to_string()));
        assert_eq!(t.parse_response("Negative."), Ok("neg".to_string()));
        assert_eq!(t.parse_response("\"NEG\""), Ok("neg".to_string()));
        assert!(t.parse_response("sentiment: maybe").is_err());
        assert!(t.parse_response("   ").is_err());
    }
}
