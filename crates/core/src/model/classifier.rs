//! Synchronous classify-and-summarize request over a single commit + diff.

use async_trait::async_trait;
use gitmem_types::{ChangeType, Classification};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ModelError;

const SYSTEM_PROMPT: &str = "\
You are classifying a single git commit. Read the commit message, the list \
of changed files, and the unified diff. Respond with a JSON object of the \
exact shape {\"classification\": <one of bug-fix|feature|refactor|docs|chore|perf|test|style>, \
\"summary\": <a 1-2 sentence natural-language summary of the change>}. \
Do not include any other text.";

const NO_SUMMARY_SENTINEL: &str = "No summary";

#[derive(Debug, Clone)]
pub struct FileChangeSummary {
    pub path: String,
    pub change_type: ChangeType,
    pub additions: i64,
    pub deletions: i64,
}

#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub commit_message: String,
    pub files: Vec<FileChangeSummary>,
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyResponse {
    pub classification: Classification,
    pub summary: String,
}

impl ClassifyRequest {
    pub fn to_user_message(&self) -> String {
        let mut out = String::new();
        out.push_str("Commit message:\n");
        out.push_str(&self.commit_message);
        out.push_str("\n\nFiles changed:\n");
        for f in &self.files {
            out.push_str(&format!(
                "{} {} +{} -{}\n",
                f.change_type.as_char(),
                f.path,
                f.additions,
                f.deletions
            ));
        }
        out.push_str("\nDiff:\n");
        out.push_str(&self.diff);
        out
    }
}

#[async_trait]
pub trait ClassifierClient: Send + Sync {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, ModelError>;
}

/// Request body shape for a vendor that supports structured/JSON-schema
/// output; `response_format` is dropped for vendors that error on it and the
/// parser falls back to tolerant text extraction either way.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    content: Vec<ChatContentBlock>,
}

#[derive(Deserialize)]
struct ChatContentBlock {
    #[serde(default)]
    text: String,
}

pub struct HttpClassifierClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl HttpClassifierClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ClassifierClient for HttpClassifierClient {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, ModelError> {
        let user_message = request.to_user_message();
        let body = ChatRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            messages: vec![ChatMessage {
                role: "user",
                content: &user_message,
            }],
            max_tokens: 1024,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::VendorError {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(parse_classify_response(&text))
    }
}

/// Tolerant parser for the classifier response: tries direct JSON decode
/// first, then strips a fenced code block, then scans for the first
/// balanced `{...}`. Unknown classifications coerce to `chore`; a missing or
/// non-string summary becomes the fixed sentinel.
pub fn parse_classify_response(text: &str) -> ClassifyResponse {
    let candidate = extract_json_object(text).unwrap_or_else(|| text.to_string());
    let value: Value = serde_json::from_str(&candidate).unwrap_or(Value::Null);

    let classification = value
        .get("classification")
        .and_then(Value::as_str)
        .map(Classification::parse_or_chore)
        .unwrap_or(Classification::Chore);

    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| NO_SUMMARY_SENTINEL.to_string());

    ClassifyResponse {
        classification,
        summary,
    }
}

fn extract_json_object(text: &str) -> Option<String> {
    let text = text.trim();
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim().to_string());
        }
    }

    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let resp = parse_classify_response(r#"{"classification": "bug-fix", "summary": "Fixed bug"}"#);
        assert_eq!(resp.classification, Classification::BugFix);
        assert_eq!(resp.summary, "Fixed bug");
    }

    #[test]
    fn parses_fenced_json() {
        let text = "Here you go:\n```json\n{\"classification\": \"feature\", \"summary\": \"Added thing\"}\n```\n";
        let resp = parse_classify_response(text);
        assert_eq!(resp.classification, Classification::Feature);
        assert_eq!(resp.summary, "Added thing");
    }

    #[test]
    fn unknown_classification_coerces_to_chore() {
        let resp = parse_classify_response(r#"{"classification": "mystery", "summary": "x"}"#);
        assert_eq!(resp.classification, Classification::Chore);
    }

    #[test]
    fn missing_summary_uses_sentinel() {
        let resp = parse_classify_response(r#"{"classification": "docs"}"#);
        assert_eq!(resp.summary, NO_SUMMARY_SENTINEL);
    }

    #[test]
    fn unparseable_text_falls_back_entirely() {
        let resp = parse_classify_response("not json at all");
        assert_eq!(resp.classification, Classification::Chore);
        assert_eq!(resp.summary, NO_SUMMARY_SENTINEL);
    }

    fn sample_request() -> ClassifyRequest {
        ClassifyRequest {
            commit_message: "fix bug".to_string(),
            files: vec![FileChangeSummary {
                path: "src/app.ts".to_string(),
                change_type: ChangeType::Modified,
                additions: 5,
                deletions: 3,
            }],
            diff: "diff --git a/src/app.ts b/src/app.ts".to_string(),
        }
    }

    #[tokio::test]
    async fn classify_parses_a_mocked_vendor_response() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::header("x-api-key", "test-key"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "{\"classification\": \"bug-fix\", \"summary\": \"Fixed bug\"}"}]
            })))
            .mount(&server)
            .await;

        let client = HttpClassifierClient::new("test-key", "claude-test").with_endpoint(server.uri());
        let resp = client.classify(sample_request()).await.unwrap();
        assert_eq!(resp.classification, Classification::BugFix);
        assert_eq!(resp.summary, "Fixed bug");
    }

    #[tokio::test]
    async fn classify_surfaces_vendor_error_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = HttpClassifierClient::new("test-key", "claude-test").with_endpoint(server.uri());
        let err = client.classify(sample_request()).await.unwrap_err();
        match err {
            ModelError::VendorError { status, .. } => assert_eq!(status, 429),
            other => panic!("expected vendor error, got {other:?}"),
        }
    }
}
