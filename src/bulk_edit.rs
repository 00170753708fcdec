//! Detection of edits made by the bulk find/replace tool.
//!
//! The tool fills its edit summary from a localized template such as
//! `Text replacement - "$1" to "$2"`. Everything before the first dash is
//! fixed per language, so that prefix identifies such edits without having to
//! match the variable part.

use std::fmt::Debug;

use crate::config::ConfigError;

// hyphen and en-dash, both appear in the localized templates
const SIGNATURE_DELIMITERS: &[char] = &['-', '\u{2013}'];

/// Source of the substring that marks a revision comment as a bulk edit.
pub trait BulkEditFilter: Debug + Send + Sync {
    /// Literal, case-sensitive substring. Revisions whose comment contains it
    /// are not counted as genuine updates.
    fn signature(&self) -> &str;
}

/// Signature derived from the tool's localized summary template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSignature {
    signature: String,
}

impl TemplateSignature {
    /// Cut `template` at the first hyphen or en-dash.
    ///
    /// Leading delimiters are skipped, so the first segment with actual
    /// content is used. Fails if there is no such segment, because an empty
    /// signature would match every comment.
    pub fn from_template(template: &str) -> Result<Self, ConfigError> {
        template
            .split(SIGNATURE_DELIMITERS)
            .find(|segment| !segment.trim().is_empty())
            .map(|segment| Self {
                signature: segment.to_owned(),
            })
            .ok_or_else(|| ConfigError::EmptyBulkEditSignature {
                template: template.to_owned(),
            })
    }
}

impl BulkEditFilter for TemplateSignature {
    fn signature(&self) -> &str {
        &self.signature
    }
}
