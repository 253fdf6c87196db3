use serde::de::DeserializeOwned;

use super::LlmError;

/// Pull the JSON payload out of a model response.
///
/// Accepts a fenced ```json block (preferred), or a bare top-level object when
/// the model skipped the fence.
pub fn extract_json_block(response: &str) -> Result<String, LlmError> {
    if let Some(json_start) = response.find("```json") {
        let content_start = json_start + 7;
        let json_end = response[content_start..]
            .find("```")
            .ok_or_else(|| LlmError::MalformedResponse("Unclosed JSON block".into()))?;
        return Ok(response[content_start..content_start + json_end].trim().to_string());
    }

    let trimmed = response.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(trimmed[start..=end].to_string()),
        _ => Err(LlmError::MalformedResponse("No JSON block found".into())),
    }
}

/// Parse the JSON payload of a model response into `T`.
pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T, LlmError> {
    let json = extract_json_block(response)?;
    serde_json::from_str(&json).map_err(|e| LlmError::MalformedResponse(e.to_string()))
}

/// Parse an array leniently: skip items that fail to deserialize.
pub fn parse_array_lenient<T: DeserializeOwned>(items: Option<&[serde_json::Value]>) -> Vec<T> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
    }

    #[test]
    fn fenced_block_is_extracted() {
        let response = "Here you go:\n```json\n{\"a\": 1}\n```\ntrailing notes";
        assert_eq!(extract_json_block(response).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn bare_object_is_accepted() {
        let response = "Sure. {\"a\": {\"b\": 2}} done";
        assert_eq!(extract_json_block(response).unwrap(), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn missing_json_is_malformed() {
        assert!(matches!(
            extract_json_block("no structure here"),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json_block("```json\n{\"a\": 1}"),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let result: Result<serde_json::Value, _> = parse_json_response("```json\n{invalid}\n```");
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn lenient_parsing_skips_bad_items() {
        let items = vec![
            serde_json::json!({"name": "first"}),
            serde_json::json!({"other": "bad"}),
            serde_json::json!({"name": "second"}),
        ];
        let parsed: Vec<Item> = parse_array_lenient(Some(&items));
        assert_eq!(
            parsed,
            vec![Item { name: "first".into() }, Item { name: "second".into() }]
        );
        assert!(parse_array_lenient::<Item>(None).is_empty());
    }
}
