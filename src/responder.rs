use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::input::OutboundPayload;

/// Anything that can answer a chat payload
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    async fn respond(&self, payload: &OutboundPayload) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

impl<'a> ChatRequest<'a> {
    fn new(payload: &'a OutboundPayload, session_id: Option<&'a str>) -> Self {
        match payload {
            OutboundPayload::Text(text) => Self {
                message: Some(text.as_str()),
                image: None,
                session_id,
            },
            OutboundPayload::Image(data_uri) => Self {
                message: None,
                image: Some(data_uri.as_str()),
                session_id,
            },
        }
    }
}

#[derive(Deserialize)]
struct ChatReply {
    response: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Interpret a reply body. Any `error` field other than `false`/`null`
/// is a failure, whatever else the body contains.
pub fn parse_reply(body: &str) -> Result<String> {
    let reply: ChatReply = serde_json::from_str(body)?;

    match reply.error {
        None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => {}
        Some(err) => return Err(ChatError::Backend(err.to_string())),
    }

    reply
        .response
        .ok_or_else(|| ChatError::MalformedResponse("missing `response` field".to_string()))
}

/// Posts payloads to the backend `/chat` route
#[derive(Clone)]
pub struct HttpResponder {
    client: Client,
    endpoint: String,
    session_id: Option<String>,
}

impl HttpResponder {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            session_id: config.session_id.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn respond(&self, payload: &OutboundPayload) -> Result<String> {
        let request = ChatRequest::new(payload, self.session_id.as_deref());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%status, "chat backend returned an error status");
            return Err(ChatError::Backend(format!("status {}", status)));
        }

        parse_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_request_carries_exactly_one_field() {
        let text = OutboundPayload::Text("leg day?".to_string());
        let json = serde_json::to_value(ChatRequest::new(&text, None)).unwrap();
        assert_eq!(json, serde_json::json!({"message": "leg day?"}));

        let image = OutboundPayload::Image("data:image/png;base64,AA==".to_string());
        let json = serde_json::to_value(ChatRequest::new(&image, Some("s1"))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"image": "data:image/png;base64,AA==", "session_id": "s1"})
        );
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(r#"{"response": "Do planks."}"#).unwrap(), "Do planks.");
        assert!(matches!(parse_reply(r#"{"error": true}"#), Err(ChatError::Backend(_))));
        assert!(matches!(
            parse_reply(r#"{"error": "quota", "response": "x"}"#),
            Err(ChatError::Backend(_))
        ));
        assert!(matches!(parse_reply("<html>"), Err(ChatError::MalformedResponse(_))));
        assert!(matches!(parse_reply("{}"), Err(ChatError::MalformedResponse(_))));
        assert_eq!(parse_reply(r#"{"response": "ok", "error": null}"#).unwrap(), "ok");
    }

    /// Serve a single canned HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{}/chat", addr), handle)
    }

    fn responder_for(endpoint: String) -> HttpResponder {
        let config = Config {
            endpoint,
            session_id: Some("gym".to_string()),
            ..Config::default()
        };
        HttpResponder::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_http_success() {
        let (url, server) = serve_once("200 OK", r#"{"response": "Stay hydrated!"}"#).await;
        let responder = responder_for(url);

        let reply = responder
            .respond(&OutboundPayload::Text("tips".to_string()))
            .await
            .unwrap();
        assert_eq!(reply, "Stay hydrated!");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat"));
        assert!(request.contains(r#""message":"tips""#));
        assert!(request.contains(r#""session_id":"gym""#));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error": "boom"}"#).await;
        let responder = responder_for(url);
        let result = responder.respond(&OutboundPayload::Text("tips".to_string())).await;
        assert!(matches!(result, Err(ChatError::Backend(_))));
    }

    #[tokio::test]
    async fn test_http_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let responder = responder_for(format!("http://{}/chat", addr));
        let result = responder.respond(&OutboundPayload::Text("tips".to_string())).await;
        assert!(matches!(result, Err(ChatError::Transport(_))));
    }
}
