//! Attribute-based XPath without a model.

use tracing::debug;

use crate::element::ElementDescriptor;
use crate::error::XPathError;
use crate::matcher::{check_xpath, DomMatch};

/// Attributes that usually identify an element. The first one present, in
/// document order, wins.
const PREFERRED_ATTRIBUTES: &[&str] = &["id", "data", "name", "label", "class"];

/// XPath string literal for `value`.
pub fn quote_literal(value: &str) -> String {
    match (value.contains('\''), value.contains('"')) {
        (false, _) => format!("'{}'", value),
        (true, false) => format!("\"{}\"", value),
        (true, true) => {
            let parts: Vec<String> = value
                .split('\'')
                .map(|part| format!("'{}'", part))
                .collect();
            format!("concat({})", parts.join(", \"'\", "))
        }
    }
}

/// `//tag[@attr='value']` from the element's most identifying attribute.
pub fn heuristic_xpath(element: &ElementDescriptor) -> Result<String, XPathError> {
    let tag = element.tag_name()?;

    let attr = element
        .attributes
        .iter()
        .find(|a| PREFERRED_ATTRIBUTES.contains(&a.name.as_str()))
        .or_else(|| element.attributes.first())
        .ok_or(XPathError::NoAttributes)?;

    Ok(format!("//{}[@{}={}]", tag, attr.name, quote_literal(&attr.value)))
}

/// [`heuristic_xpath`], rejected when the DOM has no matching element.
pub fn verified_heuristic_xpath(
    element: &ElementDescriptor,
    dom: &str,
) -> Result<String, XPathError> {
    if dom.trim().is_empty() {
        return Err(XPathError::EmptyDom);
    }
    let xpath = heuristic_xpath(element)?;
    match check_xpath(&xpath, dom) {
        DomMatch::NotFound => Err(XPathError::NotFoundInDom(xpath)),
        DomMatch::Found => Ok(xpath),
        DomMatch::Unchecked => {
            debug!("Heuristic XPath not checkable against DOM: {}", xpath);
            Ok(xpath)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_attribute_in_element_order() {
        let element = ElementDescriptor::new("INPUT")
            .with_attribute("type", "text")
            .with_attribute("name", "q")
            .with_attribute("id", "search");
        // name comes before id in the element.
        assert_eq!(heuristic_xpath(&element).unwrap(), "//input[@name='q']");
    }

    #[test]
    fn test_falls_back_to_first_attribute() {
        let element = ElementDescriptor::new("a")
            .with_attribute("href", "/x")
            .with_attribute("title", "X");
        assert_eq!(heuristic_xpath(&element).unwrap(), "//a[@href='/x']");
    }

    #[test]
    fn test_no_attributes() {
        assert_eq!(
            heuristic_xpath(&ElementDescriptor::new("div")),
            Err(XPathError::NoAttributes)
        );
    }

    #[test]
    fn test_missing_tag() {
        let element = ElementDescriptor::new("").with_attribute("id", "x");
        assert_eq!(heuristic_xpath(&element), Err(XPathError::MissingTag));
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "\"it's\"");
        assert_eq!(
            quote_literal(r#"it's "x""#),
            r#"concat('it', "'", 's "x"')"#
        );
    }

    #[test]
    fn test_verified_against_dom() {
        let element = ElementDescriptor::new("button").with_attribute("id", "go");
        let dom = r#"<body><button id="go">Go</button></body>"#;
        assert_eq!(
            verified_heuristic_xpath(&element, dom).unwrap(),
            "//button[@id='go']"
        );

        assert_eq!(
            verified_heuristic_xpath(&element, "<body></body>"),
            Err(XPathError::NotFoundInDom("//button[@id='go']".to_string()))
        );
        assert_eq!(
            verified_heuristic_xpath(&element, "  "),
            Err(XPathError::EmptyDom)
        );
    }

    #[test]
    fn test_verified_ignores_markup_lookalikes() {
        let element = ElementDescriptor::new("button").with_attribute("id", "go");
        let dom = r#"<button title="a > b" id="go">Go</button>"#;
        assert_eq!(
            verified_heuristic_xpath(&element, dom).unwrap(),
            "//button[@id='go']"
        );

        let dom = r#"<body><!-- <button id="go">old</button> --></body>"#;
        assert_eq!(
            verified_heuristic_xpath(&element, dom),
            Err(XPathError::NotFoundInDom("//button[@id='go']".to_string()))
        );
    }
}
