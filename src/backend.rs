use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::error::ClientError;

/// Default address of the local voice server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// What `/status` reports when the server is up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatus {
    /// Whether the server already has a continuous capture running.
    pub listening: bool,
}

/// The operations the session needs from a voice server.
///
/// Implementations translate calls into requests and never retry; retry and
/// timeout policy live with the callers.
#[allow(async_fn_in_trait)]
pub trait VoiceBackend {
    /// Have the server say `text` out loud.
    async fn speak(&self, text: &str) -> Result<(), ClientError>;
    /// Capture one utterance and return its transcript.
    async fn listen_once(&self) -> Result<String, ClientError>;
    async fn start_continuous(&self) -> Result<(), ClientError>;
    async fn stop_continuous(&self) -> Result<(), ClientError>;
    /// Lightweight reachability check.
    async fn check_health(&self) -> Result<ServerStatus, ClientError>;
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// A decoded `{status, ...}` reply whose status was not `"error"`.
#[derive(Debug, Clone, PartialEq)]
struct Reply {
    status: String,
    text: Option<String>,
    listening: Option<bool>,
}

/// HTTP client for the voice server.
#[derive(Debug, Clone)]
pub struct VoiceServerClient {
    http: reqwest::Client,
    base_url: String,
}

impl VoiceServerClient {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        // The server is local; never route it through a system proxy.
        let http = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Reply, ClientError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        parse_reply(status, &body)
    }

    async fn post(&self, path: &str) -> Result<Reply, ClientError> {
        log::debug!("POST {path}");
        self.send(self.http.post(self.url(path))).await
    }
}

impl VoiceBackend for VoiceServerClient {
    async fn speak(&self, text: &str) -> Result<(), ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::Backend("No text provided".into()));
        }
        log::debug!("POST /speak ({} chars)", text.len());
        let request = self.http.post(self.url("/speak")).json(&SpeakRequest { text });
        expect_success(self.send(request).await?)
    }

    async fn listen_once(&self) -> Result<String, ClientError> {
        let reply = self.post("/listen").await?;
        if reply.status != "success" {
            return Err(unexpected_status(&reply.status));
        }
        reply
            .text
            .ok_or_else(|| ClientError::MalformedResponse("listen reply has no text".into()))
    }

    async fn start_continuous(&self) -> Result<(), ClientError> {
        expect_success(self.post("/start").await?)
    }

    async fn stop_continuous(&self) -> Result<(), ClientError> {
        expect_success(self.post("/stop").await?)
    }

    async fn check_health(&self) -> Result<ServerStatus, ClientError> {
        let reply = self.send(self.http.get(self.url("/status"))).await?;
        if reply.status != "online" {
            return Err(ClientError::Backend(format!(
                "Server reported status {:?}",
                reply.status
            )));
        }
        Ok(ServerStatus {
            listening: reply.listening.unwrap_or(false),
        })
    }
}

/// Decode a server reply. The server sends JSON error bodies alongside
/// 4xx/5xx codes, so the body is read regardless of the HTTP status.
fn parse_reply(http: StatusCode, body: &str) -> Result<Reply, ClientError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if !http.is_success() => {
            return Err(ClientError::Backend(format!("HTTP {}", http.as_u16())));
        }
        Err(e) => return Err(ClientError::MalformedResponse(e.to_string())),
    };

    let status = value
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::MalformedResponse("missing status field".into()))?;

    if status == "error" {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown backend error");
        return Err(ClientError::Backend(message.to_string()));
    }

    Ok(Reply {
        status: status.to_string(),
        text: value.get("text").and_then(Value::as_str).map(str::to_string),
        listening: value.get("listening").and_then(Value::as_bool),
    })
}

fn expect_success(reply: Reply) -> Result<(), ClientError> {
    if reply.status == "success" {
        Ok(())
    } else {
        Err(unexpected_status(&reply.status))
    }
}

fn unexpected_status(status: &str) -> ClientError {
    ClientError::MalformedResponse(format!("unexpected status {status:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_reply_carries_transcript() {
        let reply = parse_reply(
            StatusCode::OK,
            r#"{"status":"success","text":"hello jarvis","confidence":1.0}"#,
        )
        .unwrap();
        assert_eq!(reply.status, "success");
        assert_eq!(reply.text.as_deref(), Some("hello jarvis"));
    }

    #[test]
    fn error_status_uses_server_message_even_on_4xx() {
        let err = parse_reply(
            StatusCode::REQUEST_TIMEOUT,
            r#"{"status":"error","message":"Timeout - no speech detected"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ClientError::Backend("Timeout - no speech detected".into())
        );
    }

    #[test]
    fn error_status_without_message_gets_placeholder() {
        let err = parse_reply(StatusCode::OK, r#"{"status":"error"}"#).unwrap_err();
        assert_eq!(err, ClientError::Backend("Unknown backend error".into()));
    }

    #[test]
    fn missing_or_non_string_status_is_malformed() {
        assert!(matches!(
            parse_reply(StatusCode::OK, r#"{"text":"hi"}"#),
            Err(ClientError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_reply(StatusCode::OK, r#"{"status":3}"#),
            Err(ClientError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_json_body() {
        assert!(matches!(
            parse_reply(StatusCode::OK, "<html>ok</html>"),
            Err(ClientError::MalformedResponse(_))
        ));
        assert_eq!(
            parse_reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").unwrap_err(),
            ClientError::Backend("HTTP 500".into())
        );
    }

    #[test]
    fn status_reply_reports_listening_flag() {
        let reply =
            parse_reply(StatusCode::OK, r#"{"status":"online","listening":true}"#).unwrap();
        assert_eq!(reply.listening, Some(true));
        let reply = parse_reply(StatusCode::OK, r#"{"status":"online"}"#).unwrap();
        assert_eq!(reply.listening, None);
    }

    #[test]
    fn only_success_counts_as_success() {
        let ok = Reply {
            status: "success".into(),
            text: None,
            listening: None,
        };
        assert!(expect_success(ok).is_ok());
        let odd = Reply {
            status: "pending".into(),
            text: None,
            listening: None,
        };
        assert!(matches!(
            expect_success(odd),
            Err(ClientError::MalformedResponse(_))
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client =
            VoiceServerClient::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url("/status"), "http://localhost:5000/status");
    }

    #[tokio::test]
    async fn empty_speech_is_rejected_locally() {
        let client = VoiceServerClient::new(DEFAULT_BASE_URL, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.speak("   ").await,
            Err(ClientError::Backend("No text provided".into()))
        );
    }

    #[tokio::test]
    async fn refused_connection_is_network_unavailable() {
        // Bind then drop to get a port with nothing listening on it.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = VoiceServerClient::new(
            &format!("http://127.0.0.1:{port}"),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.check_health().await.unwrap_err();
        assert!(err.is_network(), "got {err:?}");
    }
}
