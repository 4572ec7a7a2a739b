//! XPath generation errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XPathError {
    #[error("DOM is empty")]
    EmptyDom,

    #[error("Element tag is missing")]
    MissingTag,

    #[error("Element has no attributes to build an XPath from")]
    NoAttributes,

    #[error("XPath not found in DOM: {0}")]
    NotFoundInDom(String),

    #[error("Model response contained no XPath")]
    Unparsed,
}

impl XPathError {
    /// Stable snake_case identifier used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyDom => "empty_dom",
            Self::MissingTag => "missing_tag",
            Self::NoAttributes => "no_attributes",
            Self::NotFoundInDom(_) => "not_found_in_dom",
            Self::Unparsed => "unparsed_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(XPathError::EmptyDom.to_string(), "DOM is empty");
        assert_eq!(
            XPathError::NotFoundInDom("//a[@id='x']".to_string()).to_string(),
            "XPath not found in DOM: //a[@id='x']"
        );
    }

    #[test]
    fn test_kind() {
        assert_eq!(XPathError::NoAttributes.kind(), "no_attributes");
        assert_eq!(XPathError::Unparsed.kind(), "unparsed_response");
    }
}
