use super::*;

fn extracted(text: &str) -> XPathAnswer {
    match extract_answer(text) {
        Extraction::Extracted(answer) => answer,
        Extraction::Unparsed { raw } => panic!("expected an XPath in {:?}", raw),
    }
}

#[test]
fn test_bare_json() {
    let answer = extracted(
        r#"{"primary_xpath": "//button[@id='go']", "alternative_xpath": "//button[text()='Go']", "explanation": "Unique id."}"#,
    );
    assert_eq!(answer.primary, "//button[@id='go']");
    assert_eq!(answer.alternative.as_deref(), Some("//button[text()='Go']"));
    assert_eq!(answer.explanation.as_deref(), Some("Unique id."));
    assert_eq!(answer.format, AnswerFormat::Json);
}

#[test]
fn test_fenced_json_with_prose() {
    let text = "Sure! Here it is:\n```json\n{\n  \"primary_xpath\": \"//a[@href='/in']\",\n  \"alternative_xpath\": null\n}\n```\nHope this helps {really}.";
    let answer = extracted(text);
    assert_eq!(answer.primary, "//a[@href='/in']");
    assert_eq!(answer.alternative, None);
    assert_eq!(answer.explanation.as_deref(), Some(NO_JSON_EXPLANATION));
}

#[test]
fn test_json_without_primary_falls_through() {
    let text = "{\"primary_xpath\": \"\"}\n//div[@class='x']";
    let answer = extracted(text);
    assert_eq!(answer.primary, "//div[@class='x']");
    assert_eq!(answer.format, AnswerFormat::Line);
}

#[test]
fn test_structured_layout() {
    let text = "1. Primary XPath: `//input[@name='q']`\n2. Alternative XPath: //form//input[1]\n3. Brief explanation: The name is stable.";
    let answer = extracted(text);
    assert_eq!(answer.primary, "//input[@name='q']");
    assert_eq!(answer.alternative.as_deref(), Some("//form//input[1]"));
    assert_eq!(answer.explanation.as_deref(), Some("The name is stable."));
    assert_eq!(answer.format, AnswerFormat::Structured);
}

#[test]
fn test_first_xpath_line() {
    let text = "The element can be found with:\n```xpath\n\"//span[@data-id='7']\"\n```\nExplanation: data-id is unique.";
    let answer = extracted(text);
    assert_eq!(answer.primary, "//span[@data-id='7']");
    assert_eq!(answer.explanation.as_deref(), Some("data-id is unique."));
    assert_eq!(answer.format, AnswerFormat::Line);
}

#[test]
fn test_absolute_path_line() {
    let answer = extracted("Use this:\n/html/body/form/button[1]");
    assert_eq!(answer.primary, "/html/body/form/button[1]");
    assert_eq!(answer.format, AnswerFormat::Line);
}

#[test]
fn test_labeled_markdown_line() {
    let answer = extracted("**XPath:** `(//li)[3]`");
    assert_eq!(answer.primary, "(//li)[3]");
}

#[test]
fn test_prose_with_spaces_is_not_an_xpath() {
    assert_eq!(
        extract_answer("// this is a comment about the page"),
        Extraction::Unparsed {
            raw: "// this is a comment about the page".to_string()
        }
    );
}

#[test]
fn test_unparsed_keeps_raw_text() {
    let out = extract_answer("  I cannot help with that.  ");
    assert_eq!(
        out,
        Extraction::Unparsed {
            raw: "I cannot help with that.".to_string()
        }
    );
    assert!(out.answer().is_none());
}

#[test]
fn test_dom_warnings() {
    let answer = XPathAnswer {
        primary: "//a[@id='in']".to_string(),
        alternative: Some("//a[@id='out']".to_string()),
        explanation: None,
        format: AnswerFormat::Json,
    };
    let warnings = answer.dom_warnings("<div><a id=\"in\">x</a></div>");
    assert_eq!(warnings, vec!["Alternative XPath not found in DOM: //a[@id='out']"]);

    // Shapes the matcher does not understand produce no warning.
    let answer = XPathAnswer {
        primary: "//div/a".to_string(),
        alternative: None,
        explanation: None,
        format: AnswerFormat::Line,
    };
    assert!(answer.dom_warnings("<p></p>").is_empty());
}
