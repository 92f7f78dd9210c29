use async_trait::async_trait;
use lens_core::Generator;
use lens_core::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Client for an Ollama server's `/api/generate` endpoint, asking for a
/// single non-streamed JSON reply.
pub struct OllamaGenerator {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    format: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn generation(message: String) -> AnalysisError {
    AnalysisError::Generation { message }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError> {
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                format: "json",
                stream: false,
            })
            .send()
            .await
            .map_err(|err| generation(err.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(generation(format!("ollama returned {status}: {body}")));
        }

        let body: GenerateResponse = resp.json().await.map_err(|err| {
            AnalysisError::MalformedOutput {
                message: err.to_string(),
            }
        })?;
        Ok(body.response)
    }
}
