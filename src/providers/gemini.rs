use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use log::{debug, error, trace};
use crate::request::GenerationRequest;
use crate::snapshot::BackendDescriptor;

/// Credential header; keeps the key out of URLs and error text
pub const API_KEY_HEADER: &str = "x-goog-api-key";

// ===== Response Types =====

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<Content>
  , #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content
{   #[serde(default)]
    pub parts: Vec<Part>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part
{   #[serde(default)]
    pub text: Option<String>
}

// ===== Envelope =====

/// Build the `generateContent` body for `backend`.
/// Search and schema directives are only added when requested.
pub fn build_envelope(
  backend: &BackendDescriptor
, request: &GenerationRequest
) -> Value
{   let mut generation_config = json!({
      "temperature": request.temperature,
      "topK": request.top_k,
      "topP": request.top_p,
      "maxOutputTokens": request.max_output_tokens,
    });

    if let Some(schema) = &request.response_schema
    {   generation_config["responseMimeType"]
          = Value::String("application/json".to_string());
        generation_config["responseSchema"] = schema.clone();
    }

    let mut envelope = json!({
      "contents": [
        { "role": "user", "parts": [ { "text": request.prompt } ] }
      ],
      "generationConfig": generation_config,
    });

    if request.use_search
    {   if backend.supports_search()
        {   envelope["tools"] = json!([ { "google_search": {} } ]);
        } else
        {   debug!(
              "Search requested but {} ({}) lacks support",
              backend.name, backend.endpoint_version
            );
        }
    }

    trace!("Envelope for {}: {}", backend.name, envelope);
    envelope
}

/// Concatenated text parts of the first candidate, if any non-empty
pub fn extract_text(body: &str) -> Option<String>
{   let response: GenerateContentResponse
      = serde_json::from_str(body).ok()?;
    let candidate = response.candidates.into_iter().next()?;
    let text: String = candidate.content?
      .parts
      .into_iter()
      .filter_map(|p| p.text)
      .collect();
    if text.trim().is_empty()
    {   None
    } else
    {   Some(text)
    }
}

/// `finishReason` of the first candidate, e.g. "SAFETY"
pub fn finish_reason(body: &str) -> Option<String>
{   let response: GenerateContentResponse
      = serde_json::from_str(body).ok()?;
    response.candidates.into_iter().next()?.finish_reason
}

// ===== Transport =====

/// reqwest transport for the Gemini REST API
pub struct GeminiTransport
{   api_base: String
  , http_client: reqwest::Client
}

impl GeminiTransport
{   pub fn new(
      api_base: impl Into<String>
    , http_client: reqwest::Client
    ) -> Self
    {   let api_base: String = api_base.into();
        debug!("Creating GeminiTransport for {}", api_base);
        GeminiTransport
        {   api_base: api_base.trim_end_matches('/').to_string()
          , http_client
        }
    }

    pub fn endpoint_url(&self, backend: &BackendDescriptor) -> String
    {   format!(
          "{}/{}/models/{}:generateContent",
          self.api_base, backend.endpoint_version, backend.name
        )
    }
}

#[async_trait]
impl crate::providers::GenerationTransport for GeminiTransport
{   async fn post(
      &self
    , backend: &BackendDescriptor
    , api_key: &str
    , envelope: &Value
    ) -> Result<crate::providers::TransportResponse, crate::error::Error>
    {   let url = self.endpoint_url(backend);
        trace!("POST {}", url);

        let response = self.http_client
          .post(&url)
          .header(API_KEY_HEADER, api_key)
          .header("Content-Type", "application/json")
          .json(envelope)
          .send()
          .await
          .map_err(|e| {
            let e = e.without_url();
            error!("HTTP error for {}: {}", backend.name, e);
            crate::error::Error::HttpError(e.to_string())
          })?;

        let status = response.status().as_u16();
        trace!("{} response status: {}", backend.name, status);

        let body = response.text().await.map_err(|e| {
          let e = e.without_url();
          error!("Failed reading body from {}: {}", backend.name, e);
          crate::error::Error::HttpError(e.to_string())
        })?;

        Ok(crate::providers::TransportResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::request::GenerationOptions;

    fn request(options: GenerationOptions) -> GenerationRequest
    {   GenerationRequest::new("Describe Acme", options)
    }

    #[test]
    fn plain_envelope_has_no_tools_or_schema()
    {   let backend = BackendDescriptor::new("m", "v1beta", 1, true);
        let envelope = build_envelope(
          &backend, &request(GenerationOptions::default())
        );
        assert_eq!(
          envelope["contents"][0]["parts"][0]["text"],
          "Describe Acme"
        );
        assert_eq!(envelope["generationConfig"]["topK"], 40);
        assert!(envelope.get("tools").is_none());
        assert!(envelope["generationConfig"]
          .get("responseSchema").is_none());
    }

    #[test]
    fn search_directive_only_on_capable_backend()
    {   let options = GenerationOptions
        {   use_search: Some(true)
          , ..GenerationOptions::default()
        };
        let capable = BackendDescriptor::new("a", "v1beta", 1, true);
        let stable = BackendDescriptor::new("b", "v1", 1, true);

        let with = build_envelope(&capable, &request(options.clone()));
        assert_eq!(with["tools"][0], json!({ "google_search": {} }));

        let without = build_envelope(&stable, &request(options));
        assert!(without.get("tools").is_none());
    }

    #[test]
    fn schema_constrains_response_format()
    {   let schema = json!({ "type": "OBJECT" });
        let options = GenerationOptions
        {   response_schema: Some(schema.clone())
          , ..GenerationOptions::default()
        };
        let backend = BackendDescriptor::new("m", "v1beta", 1, false);
        let envelope = build_envelope(&backend, &request(options));
        assert_eq!(
          envelope["generationConfig"]["responseMimeType"],
          "application/json"
        );
        assert_eq!(envelope["generationConfig"]["responseSchema"], schema);
    }

    #[test]
    fn extracts_and_joins_text_parts()
    {   let body = r#"{"candidates":[{"content":{"parts":[
          {"text":"Hello, "},{"text":"Acme"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(extract_text(body), Some("Hello, Acme".to_string()));
    }

    #[test]
    fn missing_text_fails_closed()
    {   assert_eq!(extract_text(r#"{"candidates":[]}"#), None);
        assert_eq!(extract_text(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#), None);
        assert_eq!(
          extract_text(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#),
          None
        );
        assert_eq!(extract_text("not json"), None);
    }

    #[test]
    fn finish_reason_reported_for_blocked_reply()
    {   assert_eq!(
          finish_reason(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#),
          Some("SAFETY".to_string())
        );
        assert_eq!(finish_reason(r#"{"candidates":[]}"#), None);
        assert_eq!(finish_reason("not json"), None);
    }

    #[tokio::test]
    async fn transport_errors_never_carry_the_api_key()
    {   use crate::providers::GenerationTransport;

        let transport = GeminiTransport::new(
          "http://127.0.0.1:1", reqwest::Client::new()
        );
        let backend = BackendDescriptor::new("m", "v1beta", 1, false);
        let err = transport
          .post(&backend, "SECRET-KEY-123", &json!({}))
          .await
          .expect_err("nothing listens on port 1");

        let message = err.to_string();
        assert!(!message.contains("SECRET-KEY-123"), "{}", message);
        assert!(!message.contains("key="), "{}", message);
    }

    #[test]
    fn endpoint_url_includes_version_and_model()
    {   let transport = GeminiTransport::new(
          "https://example.test/", reqwest::Client::new()
        );
        let backend = BackendDescriptor::new(
          "gemini-2.0-flash", "v1beta", 1, true
        );
        assert_eq!(
          transport.endpoint_url(&backend),
          "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
