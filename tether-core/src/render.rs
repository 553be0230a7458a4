//! Request rendering seam

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(String),
}

/// Named string values available to a request template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    values: HashMap<String, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Add process variables. Strings are inserted verbatim, other JSON
    /// values in their compact JSON form. Existing keys are kept.
    pub fn extend_variables(&mut self, variables: &HashMap<String, serde_json::Value>) {
        for (name, value) in variables {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.values.entry(name.clone()).or_insert(rendered);
        }
    }
}

/// Renders the outbound request body before dispatch
pub trait RequestRenderer: Send + Sync {
    fn render_request_body(&self, template: &str, context: &RenderContext) -> Result<String, RenderError>;
}
