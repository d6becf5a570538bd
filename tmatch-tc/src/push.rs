//! Push listener: SSE subscription with reconnect backoff
//!
//! Best-effort by design. While the channel is down the reconciler relies
//! solely on the poll fallback, so a broken stream is logged and retried
//! with exponential backoff, never surfaced to the user.

use futures::StreamExt;
use tmatch_common::events::SessionEvent;
use tmatch_common::{Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 60_000;
const CONNECT_TIMEOUT_SECS: u64 = 10;

pub struct PushListener {
    http_client: reqwest::Client,
    events_url: String,
}

impl PushListener {
    pub fn new(events_url: String) -> Result<Self> {
        // A connect timeout only: a total request timeout would cut the
        // long-lived stream off mid-subscription
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            events_url,
        })
    }

    /// Run until the receiving side goes away
    ///
    /// Each connection failure doubles the backoff up to the cap; a
    /// successful connect resets it.
    pub async fn run(self, tx: mpsc::Sender<SessionEvent>) {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match self.stream_events(&tx).await {
                Ok(()) => {
                    // Server closed the stream; reconnect promptly
                    debug!("Push stream ended, reconnecting");
                    backoff_ms = INITIAL_BACKOFF_MS;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_ms,
                        "Push channel unavailable, falling back to polling until it recovers"
                    );
                }
            }

            if tx.is_closed() {
                return;
            }

            tokio::time::sleep(tmatch_common::time::millis_to_duration(backoff_ms)).await;
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }
    }

    /// One connection: subscribe and forward events until the stream ends
    async fn stream_events(&self, tx: &mpsc::Sender<SessionEvent>) -> Result<()> {
        let response = self
            .http_client
            .get(&self.events_url)
            .send()
            .await
            .map_err(|e| Error::ChannelUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::ChannelUnavailable(format!(
                "event stream returned {}",
                response.status()
            )));
        }

        info!(url = %self.events_url, "Push channel connected");

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::ChannelUnavailable(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // SSE frames are newline-delimited; hold back the trailing
            // partial line until its newline arrives
            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                if let Some(event) = parse_sse_line(line.trim_end()) {
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

/// Extract a `SessionEvent` from one SSE line
///
/// Only `data:` lines carry the payload; `event:`/`id:` lines, comments and
/// keep-alives are ignored. Unparseable payloads are dropped (the poll
/// fallback covers them).
fn parse_sse_line(line: &str) -> Option<SessionEvent> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str(data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable SSE payload");
            None
        }
    }
}
