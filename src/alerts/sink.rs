// =============================================================================
// Alert Sinks — where outbound messages are delivered
// =============================================================================
//
// Delivery is fire-and-forget and at-most-once: `dispatch` spawns the
// delivery and logs a failure; nothing is retried or queued.  The decision
// record is already in the ledger by the time a message exists.
//
//   OutboxSink   — `<dir>/message_<id>.xml`, written tmp + rename so the mail
//                  relay never picks up a partial file
//   WebhookSink  — JSON POST, optional HMAC-SHA256 body signature
//   FanoutSink   — every inner sink; fails if any inner sink failed
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::message::OutboundMessage;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Arcos-Signature";

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Deliver in the background.  Failures are logged and swallowed.
pub fn dispatch(sink: Arc<dyn AlertSink>, message: OutboundMessage) -> JoinHandle<()> {
    tokio::spawn(async move {
        match sink.deliver(&message).await {
            Ok(()) => debug!(sink = sink.name(), id = %message.message_id(), "alert delivered"),
            Err(e) => warn!(
                sink = sink.name(),
                id = %message.message_id(),
                error = %e,
                "alert delivery failed"
            ),
        }
    })
}

// =============================================================================
// OutboxSink
// =============================================================================

pub struct OutboxSink {
    dir: PathBuf,
}

impl OutboxSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, message_id: &str) -> PathBuf {
        self.dir.join(format!("message_{message_id}.xml"))
    }
}

#[async_trait]
impl AlertSink for OutboxSink {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create outbox {}", self.dir.display()))?;

        let id = message.message_id();
        let tmp = self.dir.join(format!("temp_{id}.xml"));
        let dest = self.path_for(id);

        tokio::fs::write(&tmp, message.to_xml())
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &dest)
            .await
            .with_context(|| format!("failed to rename {} -> {}", tmp.display(), dest.display()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "outbox"
    }
}

// =============================================================================
// WebhookSink
// =============================================================================

pub struct WebhookSink {
    url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl WebhookSink {
    /// The secret is only used for signing and is never logged.
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        Self {
            url: url.into(),
            secret: secret.filter(|s| !s.is_empty()),
            client,
        }
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_body(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {e}"))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl AlertSink for WebhookSink {
    #[instrument(skip(self, message), name = "webhook::deliver", fields(id = %message.message_id()))]
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        let body = message.to_json().context("failed to serialise message")?;

        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            req = req.header(SIGNATURE_HEADER, sign_body(secret, body.as_bytes())?);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .context("webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned HTTP {status}");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

// =============================================================================
// FanoutSink
// =============================================================================

pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AlertSink for FanoutSink {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        let mut failed = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(message).await {
                warn!(sink = sink.name(), error = %e, "fanout member failed");
                failed.push(sink.name());
            }
        }
        if !failed.is_empty() {
            anyhow::bail!("delivery failed for: {}", failed.join(", "));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fanout"
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::message::{MessageBody, MessageHeader, SIGNATURE};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::Router;
    use chrono::Utc;
    use parking_lot::Mutex;

    fn message(id: &str) -> OutboundMessage {
        OutboundMessage {
            header: MessageHeader {
                message_id: id.into(),
                sender: "ARCOS_BRIEFING".into(),
                timestamp: Utc::now(),
            },
            body: MessageBody {
                symbol: "MARKET_BRIEF".into(),
                signal: "INFO".into(),
                probability: 1.0,
                win_rate: 0.0,
                uncertainty: 0.0,
                sample_size: 1,
                rationale: "• NVDA  BUY (0.85) | +1.2% | Sent:0.40".into(),
                signature: SIGNATURE.into(),
                tags: vec!["digest".into()],
            },
        }
    }

    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl AlertSink for Recording {
        async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
            self.0.lock().push(message.message_id().to_string());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Unreachable;

    #[async_trait]
    impl AlertSink for Unreachable {
        async fn deliver(&self, _: &OutboundMessage) -> Result<()> {
            anyhow::bail!("connection refused")
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    #[test]
    fn hmac_matches_reference_vector() {
        let sig = sign_body("key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(sig, "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8");
    }

    #[tokio::test]
    async fn outbox_writes_complete_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutboxSink::new(dir.path().join("outbox"));
        sink.deliver(&message("RPT-40404")).await.unwrap();

        let written = std::fs::read_to_string(sink.path_for("RPT-40404")).unwrap();
        assert!(written.contains("<MessageID>RPT-40404</MessageID>"));

        let names: Vec<String> = std::fs::read_dir(sink.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["message_RPT-40404.xml"]);
    }

    #[tokio::test]
    async fn fanout_delivers_to_healthy_sinks_and_reports_failure() {
        let rec = Arc::new(Recording(Mutex::new(Vec::new())));
        let fanout = FanoutSink::new(vec![Arc::new(Unreachable), rec.clone()]);

        let err = fanout.deliver(&message("SIG-11111")).await.unwrap_err();
        assert!(err.to_string().contains("unreachable"));
        assert_eq!(*rec.0.lock(), vec!["SIG-11111".to_string()]);
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        let handle = dispatch(Arc::new(Unreachable), message("SIG-22222"));
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn webhook_posts_signed_json() {
        let seen: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let app = Router::new().route(
            "/hook",
            post(move |headers: HeaderMap, body: String| {
                let captured = captured.clone();
                async move {
                    let sig = headers
                        .get(SIGNATURE_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *captured.lock() = Some((sig, body));
                    "ok"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sink = WebhookSink::new(format!("http://{addr}/hook"), Some("s3cret".into()));
        sink.deliver(&message("SIG-33333")).await.unwrap();

        let (sig, body) = seen.lock().clone().unwrap();
        assert_eq!(sig, sign_body("s3cret", body.as_bytes()).unwrap());
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["header"]["message_id"], "SIG-33333");
    }

    #[tokio::test]
    async fn webhook_error_status_is_failure() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sink = WebhookSink::new(format!("http://{addr}/hook"), None);
        let err = sink.deliver(&message("SIG-44444")).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
