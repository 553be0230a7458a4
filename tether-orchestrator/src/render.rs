//! `${name}` placeholder rendering

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tether_core::{RenderContext, RenderError, RequestRenderer};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("placeholder pattern is valid")
});

/// Replaces `${name}` with the context value of the same name. Unknown
/// placeholders are left untouched unless the renderer is strict.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderRenderer {
    strict: bool,
}

impl PlaceholderRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on placeholders missing from the context
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn render(&self, template: &str, context: &RenderContext) -> Result<String, RenderError> {
        if self.strict {
            if let Some(missing) = PLACEHOLDER
                .captures_iter(template)
                .map(|caps| caps[1].to_string())
                .find(|name| context.get(name).is_none())
            {
                return Err(RenderError::Template(format!(
                    "no value for placeholder '{}'",
                    missing
                )));
            }
        }

        Ok(PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                context
                    .get(&caps[1])
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned())
    }
}

impl RequestRenderer for PlaceholderRenderer {
    fn render_request_body(&self, template: &str, context: &RenderContext) -> Result<String, RenderError> {
        self.render(template, context)
    }
}
