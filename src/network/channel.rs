use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::common::wire::{decode_inbound, encode_outbound};
use crate::common::{OutboundMessage, WireMessage};
use crate::error::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Trạng thái kết nối của kênh realtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Published by the supervisor while it waits before the next attempt.
    Reconnecting { attempt: u32, backoff: Duration },
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt, backoff } => {
                write!(f, "reconnecting (attempt {attempt}, in {backoff:?})")
            }
        }
    }
}

struct Link {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: oneshot::Sender<()>,
    generation: u64,
}

struct Shared {
    room_uuid: String,
    url: Url,
    handshake_timeout: Duration,
    state: watch::Sender<ChannelState>,
    link: Mutex<Option<Link>>,
    consumer: Mutex<Option<mpsc::Sender<WireMessage>>>,
    closed: AtomicBool,
    generation: AtomicU64,
}

/// A WebSocket connection to the push endpoint, scoped to one room.
///
/// The handle is cheap to clone; all clones drive the same connection. Once
/// [`LiveChannel::close`] has been called the instance is spent and a new one
/// must be created for the next room view.
#[derive(Clone)]
pub struct LiveChannel {
    shared: Arc<Shared>,
}

impl fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveChannel")
            .field("room_uuid", &self.shared.room_uuid)
            .field("state", &self.state())
            .finish()
    }
}

impl LiveChannel {
    /// `endpoint` is the bare channel url (e.g. `ws://host/chat/ws`); the room
    /// id is attached as the `roomId` query parameter.
    pub fn new(endpoint: &Url, room_uuid: impl Into<String>, handshake_timeout: Duration) -> Self {
        let room_uuid = room_uuid.into();
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("roomId", &room_uuid);

        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                room_uuid,
                url,
                handshake_timeout,
                state,
                link: Mutex::new(None),
                consumer: Mutex::new(None),
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn room_uuid(&self) -> &str {
        &self.shared.room_uuid
    }

    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Registers the inbound consumer. There is only ever one; a second
    /// registration replaces the first.
    pub fn on_message(&self, consumer: mpsc::Sender<WireMessage>) {
        if lock(&self.shared.consumer).replace(consumer).is_some() {
            log::warn!(
                "Replacing inbound consumer of live channel for room {}",
                self.shared.room_uuid
            );
        }
    }

    /// Connects to the push endpoint. A no-op while already connecting or connected.
    pub async fn open(&self) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let mut should_connect = false;
        self.shared.state.send_if_modified(|state| match state {
            ChannelState::Connecting | ChannelState::Connected => false,
            _ => {
                *state = ChannelState::Connecting;
                should_connect = true;
                true
            }
        });
        if !should_connect {
            log::debug!(
                "Live channel for room {} already open",
                self.shared.room_uuid
            );
            return Ok(());
        }

        log::debug!("Connecting to live channel '{}'...", self.shared.url);
        let handshake = tokio::time::timeout(
            self.shared.handshake_timeout,
            connect_async(self.shared.url.as_str()),
        )
        .await;

        let ws_stream = match handshake {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(err)) => {
                log::error!(
                    "Failed to connect live channel for room {}: {err}",
                    self.shared.room_uuid
                );
                self.shared.mark_disconnected();
                return Err(err.into());
            }
            Err(_) => {
                log::error!(
                    "Live channel handshake for room {} timed out after {:?}",
                    self.shared.room_uuid,
                    self.shared.handshake_timeout
                );
                self.shared.mark_disconnected();
                return Err(ChannelError::Timeout);
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut link = lock(&self.shared.link);
            if self.is_closed() {
                log::debug!(
                    "Live channel for room {} closed during handshake",
                    self.shared.room_uuid
                );
                self.shared.state.send_replace(ChannelState::Disconnected);
                return Err(ChannelError::Closed);
            }
            *link = Some(Link {
                outbound: outbound_tx,
                shutdown: shutdown_tx,
                generation,
            });
            self.shared.state.send_replace(ChannelState::Connected);
        }

        log::info!("Live channel for room {} connected", self.shared.room_uuid);
        tokio::spawn(run_link(
            ws_stream,
            outbound_rx,
            shutdown_rx,
            Arc::clone(&self.shared),
            generation,
        ));

        Ok(())
    }

    /// Queues `message` for sending. Fire-and-forget: nothing waits for the
    /// server to acknowledge it.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let state = self.state();
        if state != ChannelState::Connected {
            return Err(ChannelError::SendRejected(state.to_string()));
        }

        let frame = encode_outbound(message)?;
        let link = lock(&self.shared.link);
        let Some(link) = link.as_ref() else {
            return Err(ChannelError::SendRejected(
                ChannelState::Disconnected.to_string(),
            ));
        };
        link.outbound
            .send(frame)
            .map_err(|_| ChannelError::SendRejected(ChannelState::Disconnected.to_string()))
    }

    /// Tears the connection down. Safe to call in any state and any number of
    /// times; only the first call has an effect.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            log::debug!(
                "Live channel for room {} already closed",
                self.shared.room_uuid
            );
            return;
        }

        lock(&self.shared.consumer).take();
        {
            let mut link = lock(&self.shared.link);
            if let Some(link) = link.take() {
                let _ = link.shutdown.send(());
            }
            self.shared.state.send_replace(ChannelState::Disconnected);
        }
        log::info!("Live channel for room {} closed", self.shared.room_uuid);
    }

    pub(crate) fn mark_reconnecting(&self, attempt: u32, backoff: Duration) {
        let _link = lock(&self.shared.link);
        if self.is_closed() {
            return;
        }
        self.shared
            .state
            .send_replace(ChannelState::Reconnecting { attempt, backoff });
    }
}

impl Shared {
    fn mark_disconnected(&self) {
        let _link = lock(&self.link);
        self.state.send_replace(ChannelState::Disconnected);
    }

    /// Clears the link if it still belongs to `generation`; a link replaced by
    /// a newer connection or removed by `close` is left alone.
    fn drop_link(&self, generation: u64) {
        let mut link = lock(&self.link);
        if link
            .as_ref()
            .is_some_and(|current| current.generation == generation)
        {
            link.take();
            self.state.send_replace(ChannelState::Disconnected);
            log::warn!("Live channel for room {} disconnected", self.room_uuid);
        }
    }

    async fn forward(&self, text: &str) {
        let wire = match decode_inbound(text) {
            Ok(Some(wire)) => wire,
            Ok(None) => {
                log::trace!("Ignoring non-message event on room {}", self.room_uuid);
                return;
            }
            Err(err) => {
                log::warn!("Undecodable frame on room {}: {err}", self.room_uuid);
                return;
            }
        };

        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let consumer = lock(&self.consumer).clone();
        match consumer {
            Some(consumer) => {
                if consumer.send(wire).await.is_err() {
                    log::warn!("Inbound consumer for room {} is gone", self.room_uuid);
                }
            }
            None => log::debug!(
                "No inbound consumer for room {}; dropping message",
                self.room_uuid
            ),
        }
    }
}

async fn run_link(
    ws_stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    generation: u64,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                log::debug!("Shutting down live channel for room {}", shared.room_uuid);
                if let Err(err) = write.send(Message::Close(None)).await {
                    log::debug!("Close frame not delivered: {err}");
                }
                return;
            }
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    log::trace!("Sending frame on room {}: {frame}", shared.room_uuid);
                    if let Err(err) = write.send(Message::Text(frame.into())).await {
                        log::error!("Live channel send error on room {}: {err}", shared.room_uuid);
                        break;
                    }
                }
                None => return,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.forward(text.as_str()).await,
                Some(Ok(Message::Close(frame))) => {
                    log::info!(
                        "Server closed live channel for room {}: {frame:?}",
                        shared.room_uuid
                    );
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::error!("Live channel error on room {}: {err}", shared.room_uuid);
                    break;
                }
                None => {
                    log::info!("Live channel stream for room {} ended", shared.room_uuid);
                    break;
                }
            },
        }
    }

    shared.drop_link(generation);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
