//! XPath-against-DOM check on a parsed HTML tree.
//!
//! Only the shapes this crate produces are understood: `//tag` and
//! `//tag[@attr='value']` (`*` allowed as tag). Anything else is
//! [`DomMatch::Unchecked`].

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

static SIMPLE_XPATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^//([A-Za-z][\w-]*|\*)(?:\[@([\w:.-]+)\s*=\s*(?:'([^']*)'|"([^"]*)")\])?$"#)
        .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomMatch {
    Found,
    NotFound,
    /// The expression is outside what the matcher understands.
    Unchecked,
}

struct SimplePath<'a> {
    tag: &'a str,
    predicate: Option<(&'a str, &'a str)>,
}

fn parse(xpath: &str) -> Option<SimplePath<'_>> {
    let caps = SIMPLE_XPATH.captures(xpath.trim())?;
    let tag = caps.get(1)?.as_str();
    let predicate = match caps.get(2) {
        Some(name) => {
            let value = caps.get(3).or_else(|| caps.get(4))?.as_str();
            Some((name.as_str(), value))
        }
        None => None,
    };
    Some(SimplePath { tag, predicate })
}

/// Whether any element of `dom` matches `xpath`. Comments, script text and
/// attribute values are never mistaken for markup.
pub fn check_xpath(xpath: &str, dom: &str) -> DomMatch {
    let Some(path) = parse(xpath) else {
        return DomMatch::Unchecked;
    };

    let document = Html::parse_document(dom);
    let found = document
        .tree
        .nodes()
        .filter_map(|node| node.value().as_element())
        .any(|element| {
            let tag_ok = path.tag == "*" || element.name().eq_ignore_ascii_case(path.tag);
            tag_ok
                && match path.predicate {
                    Some((name, value)) => element
                        .attrs()
                        .any(|(attr, actual)| attr.eq_ignore_ascii_case(name) && actual == value),
                    None => true,
                }
        });

    if found {
        DomMatch::Found
    } else {
        DomMatch::NotFound
    }
}
