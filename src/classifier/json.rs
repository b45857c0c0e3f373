//! Pull a JSON object out of model output that may wrap it in markdown.

use crate::error::ClassifierError;

/// Extract JSON object from a response that might contain markdown or other text
///
/// Handles:
/// - ```json code blocks
/// - Plain ``` code blocks
/// - Raw JSON objects
pub fn extract_json_object(text: &str) -> Result<&str, ClassifierError> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Ok(text[json_start..json_start + end].trim());
        }
    }

    if let Some(start) = text.find("```") {
        let block_start = start + 3;
        let content_start = text[block_start..]
            .find('\n')
            .map(|i| block_start + i + 1)
            .unwrap_or(block_start);
        if let Some(end) = text[content_start..].find("```") {
            return Ok(text[content_start..content_start + end].trim());
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Ok(&text[start..=end]);
        }
    }

    Err(ClassifierError::MalformedResponse(
        "no JSON object found in response".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_block() {
        let text = r#"Here's the analysis:
```json
{"doc_type": "invoice", "doc_folder": "car"}
```
That's it."#;
        let json = extract_json_object(text).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("doc_folder"));
    }

    #[test]
    fn test_plain_fence() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_raw_object_with_chatter() {
        let text = "Sure! {\"a\": {\"b\": 2}} hope that helps";
        assert_eq!(extract_json_object(text).unwrap(), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn test_no_object_is_malformed() {
        assert!(matches!(
            extract_json_object("I cannot help with that"),
            Err(ClassifierError::MalformedResponse(_))
        ));
        assert!(extract_json_object("} backwards {").is_err());
    }
}
