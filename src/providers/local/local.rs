use async_trait::async_trait;
use anyhow::{Result, anyhow};
use crate::config::DeviceType;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};
use crate::providers::utils::{device_options, endpoint};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;

pub const DOCUMENT_INSTRUCTION: &str = "Represent the document for retrieval: ";
pub const QUERY_INSTRUCTION: &str = "Represent the question for retrieving supporting documents: ";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))
}

async fn post_json(client: &Client, url: Url, body: Value) -> Result<Value> {
    let response = client
        .post(url.clone())
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(anyhow!("API request failed: Status {}, Body: {}", status, error_text));
    }

    let response_json: Value = response.json().await?;
    if let Some(error) = response_json.get("error") {
        return Err(anyhow!("API returned error: {}", error));
    }
    Ok(response_json)
}

/// A model running behind a local inference server (`/api/generate`).
#[derive(Clone)]
pub struct LocalModelProvider {
    client: Client,
    generate_url: Url,
    model: String,
    options: Map<String, Value>,
}

impl LocalModelProvider {
    pub fn new(base_url: &str, model: &str, options: Map<String, Value>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            generate_url: endpoint(base_url, "api/generate")?,
            model: model.to_string(),
            options,
        })
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

#[async_trait]
impl CompletionProvider for LocalModelProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response_json = post_json(
            &self.client,
            self.generate_url.clone(),
            json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": self.options,
            }),
        )
        .await?;

        response_json
            .get("response")
            .and_then(|content| content.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                let debug_json = serde_json::to_string_pretty(&response_json).unwrap_or_default();
                anyhow!("Invalid response format. Response JSON: {}", debug_json)
            })
    }

    async fn get_model_info(&self) -> Result<String> {
        Ok(self.model.clone())
    }
}

/// Instruction-tuned embeddings served over HTTP (`/api/embed`). Every input
/// is prefixed with the instruction for its role before it is sent.
#[derive(Clone)]
pub struct InstructEmbeddings {
    client: Client,
    embed_url: Url,
    model: String,
    options: Map<String, Value>,
}

impl InstructEmbeddings {
    pub fn new(base_url: &str, model: &str, device: DeviceType) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            embed_url: endpoint(base_url, "api/embed")?,
            model: model.to_string(),
            options: device_options(device),
        })
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = inputs.len();
        let response_json = post_json(
            &self.client,
            self.embed_url.clone(),
            json!({
                "model": self.model,
                "input": inputs,
                "options": self.options,
            }),
        )
        .await?;

        let embeddings: Vec<Vec<f32>> = response_json
            .get("embeddings")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| anyhow!("Embedding response has no embeddings field"))?;

        if embeddings.len() != expected {
            return Err(anyhow!(
                "Embedding server returned {} vectors for {} inputs",
                embeddings.len(),
                expected
            ));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for InstructEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = texts
            .iter()
            .map(|text| format!("{}{}", DOCUMENT_INSTRUCTION, text))
            .collect();
        self.embed(inputs).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed(vec![format!("{}{}", QUERY_INSTRUCTION, text)]).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow!("No embedding returned for query"))
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
