//! Realtime layer: hubs, presence, sessions and the wire protocol.

pub mod hub;
pub mod presence;
pub mod protocol;
pub mod session;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::WebsocketFileConfig;
use crate::repository::PortalRepository;
use hub::ChannelHub;
use presence::PresenceTracker;

/// Everything a session needs, cloned per connection.
///
/// Chat sessions fan out through `room_hub` (keyed by room id);
/// notification sessions through `notification_hub` (keyed by user id).
#[derive(Clone)]
pub struct RealtimeState {
    pub repository: Arc<PortalRepository>,
    pub room_hub: Arc<ChannelHub>,
    pub notification_hub: Arc<ChannelHub>,
    pub presence: Arc<PresenceTracker>,
    pub websocket: WebsocketFileConfig,
    /// Cancelled on server shutdown; live sessions drain and close.
    pub shutdown: CancellationToken,
}

impl RealtimeState {
    pub fn new(repository: Arc<PortalRepository>, websocket: WebsocketFileConfig) -> Self {
        Self {
            repository,
            room_hub: Arc::new(ChannelHub::new()),
            notification_hub: Arc::new(ChannelHub::new()),
            presence: Arc::new(PresenceTracker::new()),
            websocket,
            shutdown: CancellationToken::new(),
        }
    }
}
