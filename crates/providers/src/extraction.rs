use crate::error::{ProviderError, Result};
use crate::source::ImageSource;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const PROVIDER: &str = "vision-extraction";

const EXTRACTION_PROMPT: &str = "You read identifiers printed on the subject of event photos. \
Return ONLY a JSON object of the form {\"bibNumber\": string|null, \"plateNumber\": string|null}. \
bibNumber is the race bib number worn by a runner or cyclist; plateNumber is a vehicle or \
racing number plate. Use null when the value is not clearly visible. No commentary.";

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex is valid"));

/// Fields read off the photo subject. Absent means not visible or not extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedAttributes {
    pub bib_number: Option<String>,
    pub plate_number: Option<String>,
}

/// Extract attributes, return optional fields.
#[async_trait]
pub trait AttributeExtractor: Send + Sync {
    async fn extract(&self, image: &ImageSource) -> Result<ExtractedAttributes>;
}

/// Extractor that never finds anything; used when extraction is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtractor;

#[async_trait]
impl AttributeExtractor for NoopExtractor {
    async fn extract(&self, _image: &ImageSource) -> Result<ExtractedAttributes> {
        Ok(ExtractedAttributes::default())
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl VisionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Vision model behind an OpenAI-compatible chat completions endpoint.
pub struct VisionExtractor {
    client: Client,
    config: VisionConfig,
}

impl VisionExtractor {
    pub fn new(client: Client, config: VisionConfig) -> Self {
        Self { client, config }
    }

    fn request_body(&self, image: &ImageSource) -> Value {
        json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": EXTRACTION_PROMPT},
                {"role": "user", "content": [
                    {"type": "text", "text": "Extract the identifiers from this photo."},
                    {"type": "image_url", "image_url": {"url": image.to_uri()}}
                ]}
            ]
        })
    }
}

#[async_trait]
impl AttributeExtractor for VisionExtractor {
    async fn extract(&self, image: &ImageSource) -> Result<ExtractedAttributes> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(image))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::malformed(PROVIDER, err.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "empty completion"))?;

        parse_attributes(&content)
    }
}

/// Parses a model reply that should contain a JSON object, tolerating code fences and prose.
pub fn parse_attributes(reply: &str) -> Result<ExtractedAttributes> {
    let object = JSON_OBJECT
        .find(reply)
        .ok_or_else(|| ProviderError::malformed(PROVIDER, "reply contains no JSON object"))?;
    let value: Value = serde_json::from_str(object.as_str())
        .map_err(|err| ProviderError::malformed(PROVIDER, format!("reply is not JSON: {err}")))?;

    Ok(ExtractedAttributes {
        bib_number: field(&value, &["bibNumber", "bib_number", "bib"]),
        plate_number: field(&value, &["plateNumber", "plate_number", "plate"]),
    })
}

fn field(value: &Value, keys: &[&str]) -> Option<String> {
    let raw = keys.iter().find_map(|key| value.get(*key))?;
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match text.to_ascii_lowercase().as_str() {
        "" | "null" | "none" | "n/a" | "unknown" => None,
        _ => Some(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n{\"bibNumber\": \" 1234 \", \"plateNumber\": null}\n```";
        assert_eq!(
            parse_attributes(reply).unwrap(),
            ExtractedAttributes {
                bib_number: Some("1234".to_string()),
                plate_number: None,
            }
        );
    }

    #[test]
    fn numeric_and_placeholder_values_are_normalized() {
        let reply = r#"Sure! {"bibNumber": 42, "plateNumber": "N/A"}"#;
        let parsed = parse_attributes(reply).unwrap();
        assert_eq!(parsed.bib_number.as_deref(), Some("42"));
        assert_eq!(parsed.plate_number, None);
    }

    #[test]
    fn non_json_reply_is_malformed() {
        let err = parse_attributes("I cannot see any numbers.").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn noop_extractor_returns_absent_fields() {
        let attrs = NoopExtractor
            .extract(&ImageSource::url("https://example.com/a.jpg"))
            .await
            .unwrap();
        assert_eq!(attrs, ExtractedAttributes::default());
    }
}
