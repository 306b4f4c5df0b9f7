//! Websocket connection task with reconnection

use super::{ChannelClient, ChannelShared, ClientFrame, ServerEvent};
use crate::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc::UnboundedReceiver, oneshot, Mutex as AsyncMutex};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

/// Exponential reconnect backoff: `base * 2^attempt`, capped at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff starting at `base`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; grows until the cap
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Why a live connection ended
enum Ended {
    /// Socket failed or the server closed it; reconnect
    Lost(String),
    /// Nobody can queue frames anymore; stop
    Shutdown,
}

pub(super) async fn run(
    channel: Weak<ChannelShared>,
    url: Url,
    outbound: Arc<AsyncMutex<UnboundedReceiver<ClientFrame>>>,
    mut backoff: Backoff,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut outbound = outbound.lock().await;
    let mut ready = Some(ready);
    let mut backlog: VecDeque<ClientFrame> = VecDeque::new();

    loop {
        debug!("Connecting to {}", url.host_str().unwrap_or("realtime server"));
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                backoff.reset();
                let Some(shared) = channel.upgrade() else { return };
                let client = ChannelClient::from_shared(shared);
                client.set_connected(true);
                info!("Realtime channel connected");
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }

                let ended = pump(&client, socket, &mut outbound, &mut backlog).await;
                client.set_connected(false);
                drop(client);

                match ended {
                    Ended::Lost(reason) => warn!("Realtime connection lost: {}", reason),
                    Ended::Shutdown => {
                        info!("Realtime channel shut down");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("Realtime connect failed: {}", e);
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(Error::WebSocket(e)));
                }
            }
        }

        if channel.strong_count() == 0 {
            return;
        }
        let delay = backoff.next_delay();
        debug!("Reconnecting in {:?} (attempt {})", delay, backoff.attempt());
        tokio::time::sleep(delay).await;
    }
}

async fn pump<S>(
    client: &ChannelClient,
    socket: S,
    outbound: &mut UnboundedReceiver<ClientFrame>,
    backlog: &mut VecDeque<ClientFrame>,
) -> Ended
where
    S: futures_util::Stream<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    // Resubscribe first, then flush whatever queued up while we were down
    if let Some(conversation_id) = client.joined_conversation() {
        backlog.push_front(ClientFrame::Join { conversation_id });
    }
    while let Some(frame) = backlog.pop_front() {
        if let Err(reason) = write_frame(&mut sink, &frame).await {
            backlog.push_front(frame);
            return Ended::Lost(reason);
        }
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(reason) = write_frame(&mut sink, &frame).await {
                        backlog.push_back(frame);
                        return Ended::Lost(reason);
                    }
                }
                None => return Ended::Shutdown,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => client.dispatch(event),
                    Err(e) => warn!("Invalid realtime event: {}", e),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Ended::Lost("closed by server".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Ended::Lost(e.to_string()),
            },
        }
    }
}

async fn write_frame<K>(sink: &mut K, frame: &ClientFrame) -> std::result::Result<(), String>
where
    K: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    sink.send(WsMessage::Text(text)).await.map_err(|e| e.to_string())
}
