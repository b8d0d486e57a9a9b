use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::backoff::Backoff;
use super::channel::{ChannelState, LiveChannel};

/// Sent every time the supervisor connects after losing the channel or after
/// failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconnected {
    /// Failed attempts before this one succeeded.
    pub attempts: u32,
}

/// Keeps a [`LiveChannel`] connected: Disconnected → Reconnecting → Connected,
/// with bounded exponential backoff between attempts.
///
/// The supervisor stops once the channel is closed or the backoff policy runs
/// out of attempts.
pub struct ChannelSupervisor {
    channel: LiveChannel,
    backoff: Backoff,
    reconnected: Option<mpsc::UnboundedSender<Reconnected>>,
}

impl ChannelSupervisor {
    pub fn new(channel: LiveChannel, backoff: Backoff) -> Self {
        Self {
            channel,
            backoff,
            reconnected: None,
        }
    }

    pub fn on_reconnect(mut self, sender: mpsc::UnboundedSender<Reconnected>) -> Self {
        self.reconnected = Some(sender);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let room_uuid = self.channel.room_uuid().to_string();
        let mut state_rx = self.channel.subscribe();
        let mut failures: u32 = 0;
        let mut was_connected = false;

        loop {
            if self.channel.is_closed() {
                break;
            }

            match self.channel.open().await {
                Ok(()) => {
                    // Anything sent while we were not connected, including a
                    // first connect that needed retries, is missing locally.
                    if was_connected || failures > 0 {
                        log::info!("Live channel for room {room_uuid} reconnected");
                        if let Some(sender) = &self.reconnected {
                            let _ = sender.send(Reconnected { attempts: failures });
                        }
                    }
                    was_connected = true;
                    failures = 0;

                    if disconnected(&mut state_rx).await.is_err() {
                        break;
                    }
                }
                Err(err) if self.channel.is_closed() => {
                    log::debug!("Supervisor for room {room_uuid} stopping: {err}");
                    break;
                }
                Err(err) => {
                    log::warn!("Live channel for room {room_uuid} failed to open: {err}");
                }
            }

            if self.channel.is_closed() {
                break;
            }

            failures += 1;
            if !self.backoff.allows(failures) {
                log::error!(
                    "Giving up on live channel for room {room_uuid} after {failures} attempts"
                );
                break;
            }

            let delay = self.backoff.delay(failures);
            self.channel.mark_reconnecting(failures, delay);
            log::info!("Reconnecting live channel for room {room_uuid} in {delay:?}");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                result = disconnected(&mut state_rx) => {
                    if result.is_err() || self.channel.is_closed() {
                        break;
                    }
                }
            }
        }

        log::debug!("Supervisor for room {room_uuid} finished");
    }
}

/// Resolves once the channel reports `Disconnected`, immediately if it already does.
async fn disconnected(
    state_rx: &mut watch::Receiver<ChannelState>,
) -> Result<(), watch::error::RecvError> {
    state_rx
        .wait_for(|state| *state == ChannelState::Disconnected)
        .await
        .map(|_| ())
}
