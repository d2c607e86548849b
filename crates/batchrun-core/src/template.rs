//! Prompt templating.
//!
//! A template is plain text holding a single named placeholder. Rendering
//! is literal string replacement: no escaping is applied to the identifier,
//! so identifiers containing tabs or newlines will corrupt the tab-separated
//! aggregate output downstream.

use serde::Serialize;
use std::fmt;

use crate::error::CoreError;

/// Placeholder used when none is configured.
pub const DEFAULT_PLACEHOLDER: &str = "{company_name}";

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
    placeholder: String,
}

impl PromptTemplate {
    /// Build a template, checking that `placeholder` occurs exactly once.
    pub fn new(text: impl Into<String>, placeholder: impl Into<String>) -> Result<Self, CoreError> {
        let text = text.into();
        let placeholder = placeholder.into();

        let found = if placeholder.is_empty() {
            0
        } else {
            text.matches(placeholder.as_str()).count()
        };
        if found != 1 {
            return Err(CoreError::InvalidTemplate { placeholder, found });
        }

        Ok(Self { text, placeholder })
    }

    /// Build a template using [`DEFAULT_PLACEHOLDER`].
    pub fn with_default_placeholder(text: impl Into<String>) -> Result<Self, CoreError> {
        Self::new(text, DEFAULT_PLACEHOLDER)
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Substitute `identifier` for the placeholder.
    pub fn render(&self, identifier: &str) -> TaskSpecification {
        TaskSpecification(self.text.replacen(&self.placeholder, identifier, 1))
    }
}

/// Materialized task text handed to an executor for a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpecification(String);

impl TaskSpecification {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_identifier() {
        let template =
            PromptTemplate::with_default_placeholder("Research {company_name} and report.")
                .unwrap();
        let spec = template.render("Acme");
        assert_eq!(spec.as_str(), "Research Acme and report.");
    }

    #[test]
    fn test_render_is_pure() {
        let template = PromptTemplate::new("name: <ID>", "<ID>").unwrap();
        assert_eq!(template.render("Globex"), template.render("Globex"));
        assert_eq!(template.render("Initech").as_str(), "name: Initech");
    }

    #[test]
    fn test_identifier_is_not_escaped() {
        let template = PromptTemplate::new("[{company_name}]", DEFAULT_PLACEHOLDER).unwrap();
        assert_eq!(template.render("a\tb").as_str(), "[a\tb]");
        // A placeholder-looking identifier is inserted verbatim, not re-expanded.
        assert_eq!(
            template.render("{company_name}").as_str(),
            "[{company_name}]"
        );
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let err = PromptTemplate::with_default_placeholder("no placeholder here").unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate { found: 0, .. }));
    }

    #[test]
    fn test_repeated_placeholder_rejected() {
        let err = PromptTemplate::with_default_placeholder("{company_name} and {company_name}")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate { found: 2, .. }));
    }

    #[test]
    fn test_empty_placeholder_rejected() {
        assert!(PromptTemplate::new("anything", "").is_err());
    }
}
