//! Channel hub
//!
//! In-memory fan-out registry: channel key → set of attached session
//! queues. One instance is keyed by room id (chat), a second by user id
//! (notifications); the contract is identical.

use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use super::protocol::ServerEvent;

#[derive(Default)]
pub struct ChannelHub {
    channels: RwLock<HashMap<String, HashMap<String, mpsc::Sender<ServerEvent>>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's outbound queue under a channel key. The first
    /// attach creates the channel; re-attaching the same connection id
    /// replaces its queue.
    pub async fn attach(&self, key: &str, connection_id: &str, tx: mpsc::Sender<ServerEvent>) {
        let mut channels = self.channels.write().await;
        channels
            .entry(key.to_string())
            .or_default()
            .insert(connection_id.to_string(), tx);
    }

    /// Remove a session; the channel entry is dropped when its last
    /// session detaches, so an idle hub holds no state.
    pub async fn detach(&self, key: &str, connection_id: &str) {
        let mut channels = self.channels.write().await;
        if let Some(sessions) = channels.get_mut(key) {
            sessions.remove(connection_id);
            if sessions.is_empty() {
                channels.remove(key);
            }
        }
    }

    /// Fan an event out to every session attached to `key`, except
    /// `exclude`. Delivery is fire-and-forget per session: a closed queue
    /// never stops the fan-out and gets its session evicted; a full queue
    /// (slow client) drops this event for that session only. Per-recipient
    /// ordering comes from the per-connection mpsc queue.
    ///
    /// Returns the number of sessions the event was queued for.
    pub async fn broadcast(&self, key: &str, event: ServerEvent, exclude: Option<&str>) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        {
            let channels = self.channels.read().await;
            let Some(sessions) = channels.get(key) else {
                return 0;
            };
            for (connection_id, tx) in sessions {
                if exclude.is_some_and(|ex| ex == connection_id) {
                    continue;
                }
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(connection_id.clone());
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(channel = %key, conn_id = %connection_id, "Session queue full, dropping event");
                    }
                }
            }
        }

        for connection_id in dead {
            debug!(channel = %key, conn_id = %connection_id, "Evicting closed session from hub");
            self.detach(key, &connection_id).await;
        }

        delivered
    }

    /// Number of sessions currently attached to a channel.
    pub async fn session_count(&self, key: &str) -> usize {
        self.channels
            .read()
            .await
            .get(key)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{OnlineStatus, TypingStatus};

    fn status_event() -> ServerEvent {
        ServerEvent::UserStatus {
            user_id: "u-1".to_string(),
            status: OnlineStatus::Online,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_sessions() {
        let hub = ChannelHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.attach("r-1", "c-1", tx1).await;
        hub.attach("r-1", "c-2", tx2).await;

        let delivered = hub.broadcast("r-1", status_event(), None).await;
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_respects_exclusion() {
        let hub = ChannelHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.attach("r-1", "c-1", tx1).await;
        hub.attach("r-1", "c-2", tx2).await;

        let delivered = hub.broadcast("r-1", status_event(), Some("c-1")).await;
        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let hub = ChannelHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.attach("r-1", "c-1", tx1).await;
        hub.attach("r-2", "c-2", tx2).await;

        hub.broadcast("r-1", status_event(), None).await;
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_session_is_evicted_without_blocking_others() {
        let hub = ChannelHub::new();
        let (tx1, rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.attach("r-1", "c-1", tx1).await;
        hub.attach("r-1", "c-2", tx2).await;
        drop(rx1);

        let delivered = hub.broadcast("r-1", status_event(), None).await;
        assert_eq!(delivered, 1);
        assert!(rx2.try_recv().is_ok());
        assert_eq!(hub.session_count("r-1").await, 1);
    }

    #[tokio::test]
    async fn slow_session_drops_event_but_stays_attached() {
        let hub = ChannelHub::new();
        let (tx1, mut _rx1) = mpsc::channel(1);
        hub.attach("r-1", "c-1", tx1.clone()).await;

        // Fill the queue
        tx1.try_send(status_event()).unwrap();

        let delivered = hub.broadcast("r-1", status_event(), None).await;
        assert_eq!(delivered, 0);
        assert_eq!(hub.session_count("r-1").await, 1);
    }

    #[tokio::test]
    async fn last_detach_releases_channel() {
        let hub = ChannelHub::new();
        let (tx1, _rx1) = mpsc::channel(8);
        hub.attach("r-1", "c-1", tx1).await;
        assert_eq!(hub.session_count("r-1").await, 1);

        hub.detach("r-1", "c-1").await;
        assert_eq!(hub.session_count("r-1").await, 0);
        assert!(hub.channels.read().await.get("r-1").is_none());
    }

    #[tokio::test]
    async fn per_recipient_ordering_is_fifo() {
        let hub = ChannelHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        hub.attach("r-1", "c-1", tx1).await;

        for status in [TypingStatus::Typing, TypingStatus::Stopped] {
            hub.broadcast(
                "r-1",
                ServerEvent::Typing {
                    user_id: "u-2".to_string(),
                    username: "bob".to_string(),
                    status,
                },
                None,
            )
            .await;
        }

        let first = rx1.try_recv().unwrap();
        let second = rx1.try_recv().unwrap();
        assert!(matches!(
            first,
            ServerEvent::Typing {
                status: TypingStatus::Typing,
                ..
            }
        ));
        assert!(matches!(
            second,
            ServerEvent::Typing {
                status: TypingStatus::Stopped,
                ..
            }
        ));
    }
}
