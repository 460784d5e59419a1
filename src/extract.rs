use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Everything the Gemini client needs, resolved up front by [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(
        "API key is missing; set GEMINI_API_KEY in the deployment environment or add api_key to the config file"
    )]
    MissingCredential,
    #[error("failed to build HTTP client for Gemini: {0}")]
    Client(reqwest::Error),
    #[error("failed to call Gemini generateContent endpoint: {0}")]
    Transport(reqwest::Error),
    #[error("Gemini HTTP error {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("Gemini response body is not a generateContent response: {0}")]
    Envelope(serde_json::Error),
    #[error("failed to parse concepts JSON from Gemini: {0}")]
    Parse(serde_json::Error),
}

impl ExtractError {
    /// Local configuration problems that retrying cannot fix.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::Client(_))
    }
}

#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    /// Extracts guessable concepts from free-form text.
    ///
    /// Blank input yields an empty list without touching the network.
    async fn extract_concepts(&self, text: &str) -> Result<Vec<String>, ExtractError>;
}

#[derive(Debug)]
pub struct GeminiClient {
    http: Client,
    config: ExtractorConfig,
}

impl GeminiClient {
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        let key_len = config.api_key.as_deref().map(|key| key.trim().len());
        tracing::info!(
            "Gemini client init: key available? {}, length: {}",
            key_len.is_some_and(|len| len > 0),
            key_len.unwrap_or(0)
        );

        let http = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(ExtractError::Client)?;

        Ok(Self { http, config })
    }

    fn api_key(&self) -> Result<&str, ExtractError> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ExtractError::MissingCredential)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<Option<String>, ExtractError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(ExtractError::Transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Http { status, body });
        }

        let raw = response.text().await.map_err(ExtractError::Transport)?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&raw).map_err(ExtractError::Envelope)?;

        Ok(response_text(parsed))
    }
}

#[async_trait]
impl ConceptExtractor for GeminiClient {
    async fn extract_concepts(&self, text: &str) -> Result<Vec<String>, ExtractError> {
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let api_key = self.api_key()?;
        let request = build_request(text, self.config.temperature);

        tracing::info!(
            "Requesting concepts from {} ({} chars of text)",
            self.config.model,
            text.chars().count()
        );

        let payload = match self.generate_content(api_key, &request).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!("Error extracting concepts: {}", err);
                return Err(err);
            }
        };

        match payload {
            Some(raw) => parse_concepts(&raw).inspect_err(|err| {
                tracing::error!("Error extracting concepts: {}", err);
            }),
            None => {
                tracing::warn!("Gemini returned no text payload; treating as zero concepts");
                Ok(vec![])
            }
        }
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        "Analyse the following text and extract a list of clear, standalone nouns or short concepts that are suitable for the game '30 Seconds'.\n\
         They must be terms that people can describe to each other. Avoid vague terms.\n\
         Return a generous number of unique concepts if the text allows it.\n\n\
         Text:\n\"{text}\""
    )
}

fn concepts_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "concepts": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "A list of unique concepts found in the text."
            }
        },
        "required": ["concepts"]
    })
}

fn build_request(text: &str, temperature: Option<f32>) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: build_prompt(text),
            }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: concepts_schema(),
            temperature: temperature.map(|t| t.clamp(0.0, 2.0)),
        },
    }
}

/// Concatenated text of the first candidate, or `None` when there is nothing to parse.
///
/// Whitespace-only text is still a payload and fails JSON parsing downstream.
fn response_text(response: GenerateContentResponse) -> Option<String> {
    let candidate = response.candidates.into_iter().next()?;
    if let Some(reason) = &candidate.finish_reason {
        if reason != "STOP" {
            tracing::debug!("Gemini candidate finished with reason {}", reason);
        }
    }

    let text: String = candidate
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() { None } else { Some(text) }
}

/// Reads the `concepts` array out of the model payload.
///
/// A payload without a `concepts` array counts as zero concepts. Only
/// malformed JSON is an error.
fn parse_concepts(raw: &str) -> Result<Vec<String>, ExtractError> {
    let trimmed = raw.trim();
    let json = if trimmed.starts_with("```") {
        extract_json_block(trimmed).unwrap_or_else(|| trimmed.to_string())
    } else {
        trimmed.to_string()
    };

    let parsed: Value = serde_json::from_str(&json).map_err(ExtractError::Parse)?;

    let items = match parsed.get("concepts") {
        Some(Value::Array(items)) => items,
        Some(other) => {
            tracing::warn!("Ignoring non-array concepts field: {}", other);
            return Ok(vec![]);
        }
        None => {
            tracing::debug!("Gemini payload has no concepts field");
            return Ok(vec![]);
        }
    };

    let concepts = items
        .iter()
        .filter_map(|item| match item.as_str() {
            Some(concept) => Some(concept.trim()),
            None => {
                tracing::debug!("Skipping non-string concept entry: {}", item);
                None
            }
        })
        .filter(|concept| !concept.is_empty())
        .map(str::to_string)
        .collect();

    Ok(concepts)
}

fn extract_json_block(raw: &str) -> Option<String> {
    let mut lines = raw.lines();
    let first = lines.next()?;
    if !first.starts_with("```") {
        return None;
    }

    let mut content: Vec<&str> = lines.collect();
    if content.is_empty() {
        return None;
    }

    if let Some(last) = content.last() {
        if last.trim().starts_with("```") {
            content.pop();
        }
    }

    Some(content.join("\n"))
}

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
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}
