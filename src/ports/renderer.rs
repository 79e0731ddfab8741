//! Template rendering port.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template `{template}` failed to render: {reason}")]
    Failed { template: String, reason: String },
}

impl RenderError {
    pub fn failed(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

/// Renders a named template with JSON data into a block fragment.
///
/// Template-language semantics belong to the collaborator; the engine only
/// requires a deterministic string out.
pub trait TemplateRenderer: Send + Sync {
    fn render_item(&self, template: &str, data: &Value) -> Result<String, RenderError>;
}

/// Built-in renderer with naive `{{key}}` substitution against the top-level
/// fields of the data object.
#[derive(Debug, Default)]
pub struct SubstitutionRenderer;

impl TemplateRenderer for SubstitutionRenderer {
    fn render_item(&self, template: &str, data: &Value) -> Result<String, RenderError> {
        let mut rendered = template.to_string();
        if let Value::Object(fields) = data {
            for (key, value) in fields {
                let placeholder = format!("{{{{{key}}}}}");
                let substitution = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                rendered = rendered.replace(&placeholder, &substitution);
            }
        }
        Ok(rendered)
    }
}
