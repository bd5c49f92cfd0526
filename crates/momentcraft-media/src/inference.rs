use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::caption::{CaptionModel, SummaryModel};

const BLIP_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/Salesforce/blip-image-captioning-base";
const BART_ENDPOINT: &str = "https://api-inference.huggingface.co/models/facebook/bart-large-cnn";
const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const OPENAI_VISION_MODEL: &str = "gpt-4o";
const OPENAI_PROMPT: &str = "Describe this image in one sentence.";

/// BLIP image captioning through the Hugging Face inference API.
pub struct BlipCaptioner {
    http: reqwest::Client,
    api_key: String,
}

impl BlipCaptioner {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self { http, api_key: api_key.into() }
    }
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: Option<String>,
}

#[async_trait]
impl CaptionModel for BlipCaptioner {
    fn name(&self) -> &str {
        "huggingface/blip"
    }

    async fn caption(&self, image_base64: &str) -> Result<String> {
        let body = post_json(
            &self.http,
            BLIP_ENDPOINT,
            &self.api_key,
            &json!({ "inputs": image_base64 }),
        )
        .await?;
        parse_blip(&body)
    }
}

fn parse_blip(body: &[u8]) -> Result<String> {
    let outputs: Vec<GeneratedText> = serde_json::from_slice(body)?;
    Ok(outputs
        .into_iter()
        .next()
        .and_then(|o| o.generated_text)
        .unwrap_or_default())
}

/// Vision-capable chat model used as the fallback captioner.
pub struct OpenAiVisionCaptioner {
    http: reqwest::Client,
    api_key: String,
}

impl OpenAiVisionCaptioner {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self { http, api_key: api_key.into() }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl CaptionModel for OpenAiVisionCaptioner {
    fn name(&self) -> &str {
        "openai/gpt-4o"
    }

    fn placeholder(&self) -> &str {
        "OpenAI caption unavailable"
    }

    async fn caption(&self, image_base64: &str) -> Result<String> {
        let request = json!({
            "model": OPENAI_VISION_MODEL,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": OPENAI_PROMPT },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{image_base64}") },
                    },
                ],
            }],
            "max_tokens": 50,
        });
        let body = post_json(&self.http, OPENAI_CHAT_ENDPOINT, &self.api_key, &request).await?;
        parse_chat(&body)
    }
}

fn parse_chat(body: &[u8]) -> Result<String> {
    let completion: ChatCompletion = serde_json::from_slice(body)?;
    Ok(completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

/// BART summarization through the Hugging Face inference API.
pub struct BartSummarizer {
    http: reqwest::Client,
    api_key: String,
}

impl BartSummarizer {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self { http, api_key: api_key.into() }
    }
}

#[derive(Deserialize)]
struct SummaryText {
    summary_text: Option<String>,
}

#[async_trait]
impl SummaryModel for BartSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let request = json!({ "inputs": text });
        let body = post_json(&self.http, BART_ENDPOINT, &self.api_key, &request).await?;
        let outputs: Vec<SummaryText> = serde_json::from_slice(&body)?;
        match outputs.into_iter().next().and_then(|o| o.summary_text) {
            Some(summary) => Ok(summary),
            None => bail!("summarizer returned no summary_text"),
        }
    }
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<Vec<u8>> {
    let response = http.post(url).bearer_auth(api_key).json(body).send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        bail!("{} returned {}: {}", url, status, String::from_utf8_lossy(&bytes));
    }
    Ok(bytes.to_vec())
}
