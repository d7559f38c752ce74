//! Status and bio generation through the Gemini `generateContent` API.

use crate::profile::{Profile, ProfilePatch};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_STYLE: &str = "modern professional";

#[derive(Error, Debug)]
pub enum BioError {
    #[error("no API key: set GEMINI_API_KEY or API_KEY")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("response text is not a status/bio object: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Generated card copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBio {
    pub status: String,
    pub bio: String,
}

impl GeneratedBio {
    pub fn apply_to(&self, profile: &mut Profile) {
        profile.merge(self.as_patch());
    }

    pub fn as_patch(&self) -> ProfilePatch {
        ProfilePatch {
            status: Some(self.status.clone()),
            bio: Some(self.bio.clone()),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct BioClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl BioClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_ENDPOINT.to_string())
    }

    /// Client against a custom endpoint. Mainly used for testing.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Configure from `GEMINI_API_KEY` (or `API_KEY`), `PERSONAR_BIO_MODEL`
    /// and `PERSONAR_BIO_ENDPOINT`.
    pub fn from_env() -> Result<Self, BioError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(BioError::MissingApiKey)?;
        let base_url =
            std::env::var("PERSONAR_BIO_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let mut client = Self::with_base_url(api_key, base_url);
        if let Ok(model) = std::env::var("PERSONAR_BIO_MODEL") {
            client.model = model;
        }
        Ok(client)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a status and bio, or `None` on any failure (logged).
    pub async fn generate(&self, name: &str, style: Option<&str>) -> Option<GeneratedBio> {
        match self.try_generate(name, style).await {
            Ok(bio) => Some(bio),
            Err(e) => {
                tracing::error!(error = %e, name, "bio generation failed");
                None
            }
        }
    }

    pub async fn try_generate(&self, name: &str, style: Option<&str>) -> Result<GeneratedBio, BioError> {
        let style = style.unwrap_or(DEFAULT_STYLE);
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);

        tracing::debug!(model = %self.model, name, style, "requesting bio");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(name, style))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BioError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(BioError::EmptyResponse)?;

        let bio: GeneratedBio = serde_json::from_str(text.trim())?;
        tracing::info!(name, "bio generated");
        Ok(bio)
    }
}

fn prompt(name: &str, style: &str) -> String {
    format!(
        "Generate a short, punchy, one-sentence AR status quote and a two-sentence creative bio for a person named {name}. The style should be {style}."
    )
}

fn request_body(name: &str, style: &str) -> serde_json::Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt(name, style) }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "status": {
                        "type": "STRING",
                        "description": "A punchy one-sentence status quote."
                    },
                    "bio": {
                        "type": "STRING",
                        "description": "A two-sentence creative professional bio."
                    }
                },
                "required": ["status", "bio"]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-3-flash-preview:generateContent";

    fn reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
        }))
    }

    fn client_for(server: &MockServer) -> BioClient {
        BioClient::with_base_url("test-key".into(), server.uri())
    }

    #[tokio::test]
    async fn test_generate_parses_structured_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(reply(r#" {"status":"Seeing the world in layers.","bio":"Owen builds AR. He also writes."} "#))
            .expect(1)
            .mount(&server)
            .await;

        let bio = client_for(&server).try_generate("Owen Chen", None).await.unwrap();
        assert_eq!(bio.status, "Seeing the world in layers.");
        assert_eq!(bio.bio, "Owen builds AR. He also writes.");
    }

    #[tokio::test]
    async fn test_prompt_carries_name_and_style() {
        let server = MockServer::start().await;
        let expected = prompt("Jun Kim", "playful");
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "contents": [{ "parts": [{ "text": expected }] }] })))
            .respond_with(reply(r#"{"status":"s","bio":"b"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.generate("Jun Kim", Some("playful")).await.is_some());
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        match client.try_generate("Khoi", None).await {
            Err(BioError::Api { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(client.generate("Khoi", None).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_or_malformed_text_is_no_update() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/empty:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/prose:generateContent"))
            .respond_with(reply("Here is your bio!"))
            .mount(&server)
            .await;

        let empty = client_for(&server).with_model("empty");
        assert!(matches!(empty.try_generate("x", None).await, Err(BioError::EmptyResponse)));

        let prose = client_for(&server).with_model("prose");
        assert!(matches!(prose.try_generate("x", None).await, Err(BioError::Malformed(_))));
        assert!(prose.generate("x", None).await.is_none());
    }

    #[test]
    fn test_apply_to_profile() {
        let mut profile = crate::profile::sample("owen_research");
        let generated = GeneratedBio {
            status: "new".into(),
            bio: "fresh".into(),
        };
        generated.apply_to(&mut profile);
        assert_eq!(profile.status, "new");
        assert_eq!(profile.bio, "fresh");
        assert_eq!(profile.handle, "owen_research");
    }

    #[test]
    fn test_request_schema_requires_both_fields() {
        let body = request_body("A", DEFAULT_STYLE);
        let schema = &body["generationConfig"]["responseSchema"];
        assert_eq!(schema["required"], json!(["status", "bio"]));
        assert!(body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("The style should be modern professional."));
    }
}
