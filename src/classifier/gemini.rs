//! Gemini API client
//!
//! Sends the prompt, extracted text and optional upload to the Generative
//! Language `generateContent` endpoint and parses the structured answer.
//! 429, 5xx and transport errors are retried with exponential backoff.

use super::json::extract_json_object;
use super::{ClassificationRequest, ClassificationResult, Classifier};
use crate::categories::CategorySet;
use crate::error::ClassifierError;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_delay: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

pub struct GeminiClassifier {
    client: Client,
    config: GeminiConfig,
    /// JSON schema constraining the answer, with `doc_folder` limited to the categories
    response_schema: Value,
}

impl GeminiClassifier {
    pub fn new(config: GeminiConfig, categories: &CategorySet) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            response_schema: response_schema(categories),
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_body(&self, request: &ClassificationRequest) -> GenerateContentRequest {
        let mut parts = Vec::new();

        if let Some(asset) = &request.asset {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: asset.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&asset.bytes),
                },
            });
        }
        if let Some(content) = &request.content {
            parts.push(Part::Text {
                text: format!("Document content:\n{}", content),
            });
        }
        parts.push(Part::Text {
            text: request.prompt.clone(),
        });

        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: self.response_schema.clone(),
                temperature: 0.1,
            },
        }
    }

    /// Send request with retry logic
    async fn send_request(
        &self,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ClassifierError> {
        let mut retry_delay = self.config.retry_delay;
        let max_retries = self.config.max_retries;

        for retry in 0..=max_retries {
            if retry > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let resp = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.config.api_key)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(r) if r.status().is_success() => {
                    return r.json().await.map_err(|e| {
                        ClassifierError::MalformedResponse(format!("invalid response body: {}", e))
                    });
                }
                Ok(r) if is_retryable(r.status()) => {
                    tracing::warn!(
                        "[Gemini] {} from API, retry {}/{}",
                        r.status(),
                        retry + 1,
                        max_retries
                    );
                    continue;
                }
                Ok(r) => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(ClassifierError::Api { status, body });
                }
                Err(e) => {
                    if retry == max_retries {
                        return Err(ClassifierError::Http(e));
                    }
                    tracing::warn!(
                        "[Gemini] Request failed ({}), retry {}/{}",
                        e,
                        retry + 1,
                        max_retries
                    );
                    continue;
                }
            }
        }

        Err(ClassifierError::RetriesExhausted(max_retries))
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifierError> {
        let body = self.build_body(&request);
        let response = self.send_request(&body).await?;
        parse_response(&response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn response_schema(categories: &CategorySet) -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "doc_type": { "type": "STRING" },
            "doc_date": { "type": "STRING" },
            "doc_topic": { "type": "STRING" },
            "doc_owner": { "type": "STRING" },
            "doc_folder": {
                "type": "STRING",
                "format": "enum",
                "enum": categories.names(),
            },
            "doc_keywords": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
            },
        },
        "required": ["doc_type", "doc_date", "doc_topic", "doc_owner", "doc_folder", "doc_keywords"],
    })
}

fn parse_response(response: &GenerateContentResponse) -> Result<ClassificationResult, ClassifierError> {
    let text = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(|c| c.parts.iter().find_map(|p| p.text.as_deref()))
        .ok_or_else(|| ClassifierError::MalformedResponse("no candidates in response".to_string()))?;

    let json_str = extract_json_object(text)?;

    #[derive(Deserialize)]
    struct RawClassification {
        doc_type: String,
        doc_date: String,
        doc_topic: String,
        doc_owner: String,
        doc_folder: String,
        #[serde(default)]
        doc_keywords: Vec<String>,
    }

    let raw: RawClassification = serde_json::from_str(json_str)
        .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

    Ok(ClassificationResult {
        doc_type: raw.doc_type,
        date: raw.doc_date,
        topic: raw.doc_topic,
        owner: raw.doc_owner,
        folder: raw.doc_folder,
        keywords: raw.doc_keywords,
    })
}

// === Wire types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Upload;

    fn classifier() -> GeminiClassifier {
        GeminiClassifier::new(
            GeminiConfig::new("test-key", "gemini-test"),
            &CategorySet::default(),
        )
        .unwrap()
    }

    fn response(text: &str) -> GenerateContentResponse {
        serde_json::from_value(json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        }))
        .unwrap()
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            classifier().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn test_body_has_upload_content_and_prompt() {
        let request = ClassificationRequest {
            prompt: "the prompt".into(),
            content: Some("invoice text".into()),
            asset: Some(Upload {
                bytes: b"%PDF".to_vec(),
                mime_type: "application/pdf".into(),
            }),
        };
        let body = serde_json::to_value(classifier().build_body(&request)).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[0]["inlineData"]["data"], "JVBERg==");
        assert!(parts[1]["text"].as_str().unwrap().contains("invoice text"));
        assert_eq!(parts[2]["text"], "the prompt");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );

        let folders = body["generationConfig"]["responseSchema"]["properties"]["doc_folder"]["enum"]
            .as_array()
            .unwrap();
        assert!(folders.iter().any(|f| f == "car"));
        assert!(folders.iter().any(|f| f == "misc"));
    }

    #[test]
    fn test_parse_structured_answer() {
        let result = parse_response(&response(
            r#"{"doc_type":"invoice","doc_date":"2016-01-01","doc_topic":"car insurance","doc_owner":"John","doc_folder":"car","doc_keywords":["policy"]}"#,
        ))
        .unwrap();

        assert_eq!(result.topic, "car insurance");
        assert_eq!(result.date, "2016-01-01");
        assert_eq!(result.folder, "car");
        assert_eq!(result.keywords, vec!["policy".to_string()]);
    }

    #[test]
    fn test_parse_missing_field_is_malformed() {
        let err = parse_response(&response(r#"{"doc_type":"invoice"}"#)).unwrap_err();
        assert!(matches!(err, ClassifierError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_empty_candidates_is_malformed() {
        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            parse_response(&empty),
            Err(ClassifierError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }
}
