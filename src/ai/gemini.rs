// src/ai/gemini.rs
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::connector::AiConnector;
use crate::capture::image::{CapturedImage, UPLOAD_MIME_TYPE};
use crate::config::{Credential, Settings};

const API_KEY_HEADER: &str = "x-goog-api-key";

// Implementation for Gemini `generateContent` over REST
pub struct GeminiClient {
    base_url: String,
    model_name: String,
    credential: Credential,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        info!("Initializing Gemini model: {} at {}", settings.model, settings.base_url);

        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: settings.base_url.clone(),
            model_name: settings.model.clone(),
            credential: settings.credential.clone(),
            client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn endpoint(&self) -> String {
        endpoint_url(&self.base_url, &self.model_name)
    }
}

fn endpoint_url(base_url: &str, model_name: &str) -> String {
    let model = model_name.strip_prefix("models/").unwrap_or(model_name);
    format!("{}/models/{}:generateContent", base_url.trim_end_matches('/'), model)
}

fn build_request(prompt: &str, image_png: &[u8]) -> GenerateRequest {
    let text_part = Part {
        text: Some(prompt.to_string()),
        inline_data: None,
    };
    let image_part = Part {
        text: None,
        inline_data: Some(Blob {
            mime_type: UPLOAD_MIME_TYPE.to_string(),
            data: general_purpose::STANDARD.encode(image_png),
        }),
    };

    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![text_part, image_part],
        }],
    }
}

/// Pull the answer out of a successful response. Missing text is an empty
/// answer; a prompt rejected outright is an error.
fn extract_text(response: GenerateResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(anyhow!("Prompt blocked by Gemini: {}", reason));
        }
        warn!("Gemini returned no candidates");
        return Ok(String::new());
    };

    Ok(candidate
        .content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join(""))
}

fn api_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(kind) => anyhow!("Gemini API error ({} {}): {}", status.as_u16(), kind, envelope.error.message),
            None => anyhow!("Gemini API error ({}): {}", status.as_u16(), envelope.error.message),
        },
        Err(_) => anyhow!("Gemini API error ({}): {}", status.as_u16(), body.trim()),
    }
}

impl AiConnector for GeminiClient {
    fn generate(&self, prompt: &str, image: &CapturedImage) -> Result<String> {
        info!("Processing image with Gemini model: {}", self.model_name);

        let image_png = image.encode_png()?;
        let request = build_request(prompt, &image_png);

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.credential.expose())
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request to Gemini timed out: {}", e)
                } else {
                    anyhow!("Gemini request failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let data: GenerateResponse = response.json()?;
        extract_text(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_carries_prompt_then_inline_png() {
        let request = build_request("describe", &[1, 2, 3]);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "describe" },
                        { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                    ]
                }]
            })
        );
    }

    #[test]
    fn endpoint_accepts_prefixed_model_names() {
        assert_eq!(
            endpoint_url("https://host/v1beta/", "models/gemini-1.5-flash"),
            "https://host/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(
            endpoint_url("https://host/v1beta", "gemini-pro-vision"),
            "https://host/v1beta/models/gemini-pro-vision:generateContent"
        );
    }

    #[test]
    fn answer_joins_text_parts_of_first_candidate() {
        let response = parse(json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "The total " }, { "text": "is $42.17" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }));
        assert_eq!(extract_text(response).unwrap(), "The total is $42.17");
    }

    #[test]
    fn missing_text_is_empty_answer() {
        let response = parse(json!({ "candidates": [{ "finishReason": "SAFETY" }] }));
        assert_eq!(extract_text(response).unwrap(), "");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let response = parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn api_error_message_is_extracted() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let err = api_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(err.to_string(), "Gemini API error (400 INVALID_ARGUMENT): API key not valid.");
    }

    #[test]
    fn non_json_error_body_is_kept() {
        let err = api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.to_string(), "Gemini API error (502): upstream down");
    }

    mod http {
        use super::super::*;
        use crate::capture::image::sample_image;
        use crate::capture::permission::PermissionState;
        use std::io::{Read, Write};
        use std::net::{TcpListener, TcpStream};
        use std::thread::{self, JoinHandle};

        /// Answers a single request with a canned response and hands back
        /// the raw request it received.
        fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let base_url = format!("http://{}/v1beta", listener.local_addr().unwrap());
            let body = body.to_string();
            let handle = thread::spawn(move || {
                let (mut stream, _) = listener.accept().unwrap();
                let request = read_request(&mut stream);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
                request
            });
            (base_url, handle)
        }

        fn read_request(stream: &mut TcpStream) -> String {
            let mut data = Vec::new();
            let mut buf = [0u8; 8192];
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..n]);
                if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if data.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            String::from_utf8_lossy(&data).into_owned()
        }

        fn client(base_url: String) -> GeminiClient {
            let settings = Settings {
                credential: Credential::parse("sk-live-abc123").unwrap(),
                model: "gemini-test".to_string(),
                base_url,
                timeout: Duration::from_secs(10),
                camera_access: PermissionState::NotDetermined,
            };
            GeminiClient::new(&settings).unwrap()
        }

        #[test]
        fn successful_response_becomes_answer() {
            let (base_url, server) = serve_once(
                200,
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"The total is $42.17"}]}}]}"#,
            );
            let answer = client(base_url).generate("What is the total?", &sample_image(2, 2)).unwrap();
            assert_eq!(answer, "The total is $42.17");

            let request = server.join().unwrap();
            assert!(request.starts_with("POST /v1beta/models/gemini-test:generateContent "));
            assert!(request.to_ascii_lowercase().contains("x-goog-api-key: sk-live-abc123"));
            assert!(request.contains("\"text\":\"What is the total?\""));
            assert!(request.contains("\"mimeType\":\"image/png\""));
        }

        #[test]
        fn error_status_carries_api_message() {
            let (base_url, server) = serve_once(
                403,
                r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#,
            );
            let err = client(base_url).generate("What is the total?", &sample_image(1, 1)).unwrap_err();
            assert_eq!(err.to_string(), "Gemini API error (403 PERMISSION_DENIED): API key not valid.");
            server.join().unwrap();
        }
    }
}
