//! Push channel over the vendor's streaming WebSocket.
//!
//! [`WebSocketPush::subscribe`] performs the first handshake inline so the
//! caller learns about connect failures, then hands the socket to a
//! background reader. The reader forwards every JSON text frame into the
//! caller's bounded `mpsc` sink and reconnects with exponential backoff.
//! When the reconnect budget runs out the reader exits and drops the sink.
//!
//! # Example
//!
//! ```rust,ignore
//! use airly_api::{PushChannel, ReconnectConfig, WebSocketPush};
//!
//! let push = WebSocketPush::new(push_url, ReconnectConfig::default());
//! let (tx, mut rx) = tokio::sync::mpsc::channel(256);
//! let sub = push.subscribe(&token, tx).await?;
//!
//! while let Some(msg) = rx.recv().await {
//!     println!("{msg}");
//! }
//! sub.unsubscribe().await;
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{PushChannel, PushSubscription};
use crate::auth::AccessToken;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Reconnection attempts before the reader gives up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: Some(5),
        }
    }
}

impl ReconnectConfig {
    /// `min(initial * 2^attempt, max)`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

// ── WebSocketPush ────────────────────────────────────────────────────

/// [`PushChannel`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketPush {
    url: Url,
    reconnect: ReconnectConfig,
}

impl WebSocketPush {
    pub fn new(url: Url, reconnect: ReconnectConfig) -> Self {
        Self { url, reconnect }
    }
}

impl PushChannel for WebSocketPush {
    async fn subscribe(
        &self,
        token: &AccessToken,
        sink: mpsc::Sender<Value>,
    ) -> Result<PushSubscription, Error> {
        let stream = connect(&self.url, token).await?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reader_loop(
            stream,
            self.url.clone(),
            token.clone(),
            sink,
            self.reconnect.clone(),
            cancel.clone(),
        ));

        Ok(PushSubscription::new(cancel, Some(handle)))
    }
}

// ── Background reader ────────────────────────────────────────────────

enum ReadOutcome {
    /// Socket closed or errored; reconnect.
    Disconnected(Option<Error>),
    /// Cancelled or the receiver went away; stop for good.
    Stop,
}

/// Read from `stream` until it drops, then reconnect with backoff.
async fn reader_loop(
    stream: WsStream,
    url: Url,
    token: AccessToken,
    sink: mpsc::Sender<Value>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut current = Some(stream);
    let mut attempt: u32 = 0;

    loop {
        if let Some(stream) = current.take() {
            match read_until_closed(stream, &sink, &cancel).await {
                ReadOutcome::Stop => break,
                ReadOutcome::Disconnected(Some(e)) => {
                    warn!(error = %e, "push channel dropped");
                }
                ReadOutcome::Disconnected(None) => {
                    info!("push channel closed by server");
                }
            }
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                warn!(max_retries = max, "push reconnection limit reached, giving up");
                break;
            }
        }

        let delay = reconnect.delay_for(attempt);
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before push reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;

        match connect(&url, &token).await {
            Ok(stream) => {
                attempt = 0;
                current = Some(stream);
            }
            Err(e) => warn!(error = %e, attempt, "push reconnect failed"),
        }
    }

    debug!("push reader exiting");
}

async fn connect(url: &Url, token: &AccessToken) -> Result<WsStream, Error> {
    info!(url = %url, "connecting push channel");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri).with_header("x-access-token", token.expose());

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| match e {
            tungstenite::Error::Http(resp) if resp.status().as_u16() == 401 => {
                Error::Authentication {
                    message: "push channel rejected the access token".into(),
                }
            }
            other => Error::WebSocketConnect(other.to_string()),
        })?;

    info!("push channel connected");
    Ok(stream)
}

async fn read_until_closed(
    stream: WsStream,
    sink: &mpsc::Sender<Value>,
    cancel: &CancellationToken,
) -> ReadOutcome {
    let (_write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return ReadOutcome::Stop,
            frame = read.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    let Some(message) = parse_message(&text) else { continue };
                    if sink.send(message).await.is_err() {
                        return ReadOutcome::Stop;
                    }
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    return ReadOutcome::Disconnected(frame.map(|cf| Error::WebSocketClosed {
                        code: cf.code.into(),
                        reason: cf.reason.to_string(),
                    }));
                }
                Some(Err(e)) => {
                    return ReadOutcome::Disconnected(Some(Error::WebSocketConnect(e.to_string())));
                }
                None => return ReadOutcome::Disconnected(None),
                // Ping, Pong, Binary, Frame
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Parse one text frame. Non-object payloads are ignored.
fn parse_message(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => {
            debug!("ignoring non-object push frame");
            None
        }
        Err(e) => {
            debug!(error = %e, "failed to parse push frame");
            None
        }
    }
}
