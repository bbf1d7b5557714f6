//! Document naming

use crate::error::{Error, Result};

/// Sentinel name used when a connection does not address a document.
pub const DEFAULT_DOCUMENT: &str = "default";

/// Document name - URL-safe UTF-8 string, max 512 bytes.
///
/// An empty input resolves to the [`DEFAULT_DOCUMENT`] sentinel, so a
/// `DocumentName` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentName(String);

impl DocumentName {
    /// Create a new document name, validating the format
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Ok(Self(DEFAULT_DOCUMENT.to_string()));
        }

        if name.len() > 512 {
            return Err(Error::InvalidDocumentName(
                "Document name exceeds 512 bytes".into(),
            ));
        }

        // Validate pattern: [a-zA-Z0-9._:-]+
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
        {
            return Err(Error::InvalidDocumentName(
                "Document name must match pattern [a-zA-Z0-9._:-]+".into(),
            ));
        }

        Ok(Self(name))
    }

    /// Resolve a name from a URL path segment, e.g. the `{name}` in
    /// `/collab/{name}`. Leading and trailing slashes are ignored.
    pub fn from_path_segment(segment: &str) -> Result<Self> {
        Self::new(segment.trim_matches('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(DocumentName::new("notes").is_ok());
        assert!(DocumentName::new("team:standup-2024.03").is_ok());
        assert!(DocumentName::new("my_pad").is_ok());
    }

    #[test]
    fn test_empty_resolves_to_default() {
        assert_eq!(DocumentName::new("").unwrap().as_str(), DEFAULT_DOCUMENT);
        assert_eq!(
            DocumentName::from_path_segment("/").unwrap().as_str(),
            DEFAULT_DOCUMENT
        );
    }

    #[test]
    fn test_invalid_names() {
        assert!(DocumentName::new("a/b").is_err()); // invalid char
        assert!(DocumentName::new("pad name").is_err()); // whitespace
        assert!(DocumentName::new("a".repeat(513)).is_err()); // too long
    }

    #[test]
    fn test_from_path_segment() {
        assert_eq!(
            DocumentName::from_path_segment("/alpha/").unwrap().as_str(),
            "alpha"
        );
        assert_eq!(
            DocumentName::from_path_segment("alpha").unwrap().as_str(),
            "alpha"
        );
    }
}
