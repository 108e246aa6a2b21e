//! Network policy consumed by the queue processor
//!
//! The host app owns connectivity detection (NetInfo on the JS side) and the
//! user's download preferences; it pushes both in through
//! `WatchedNetworkPolicy`. The processor only asks questions.

use crate::download::config::DownloadSettings;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Kind of active connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    None,
    Wifi,
    Cellular,
    Other,
}

/// Connectivity as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub online: bool,
    pub connection: ConnectionType,
}

impl NetworkStatus {
    pub fn offline() -> Self {
        Self { online: false, connection: ConnectionType::None }
    }

    pub fn wifi() -> Self {
        Self { online: true, connection: ConnectionType::Wifi }
    }

    pub fn cellular() -> Self {
        Self { online: true, connection: ConnectionType::Cellular }
    }

    pub fn is_wifi(&self) -> bool {
        self.online && self.connection == ConnectionType::Wifi
    }

    /// Whether moving from `previous` to `self` could unblock queued work
    pub fn improved_from(&self, previous: &NetworkStatus) -> bool {
        (self.online && !previous.online) || (self.is_wifi() && !previous.is_wifi())
    }
}

/// Connectivity and preference source for the queue processor
#[async_trait]
pub trait NetworkPolicy: Send + Sync {
    async fn is_online(&self) -> bool;

    async fn is_wifi(&self) -> bool;

    async fn settings(&self) -> DownloadSettings;

    /// Fires on every connectivity transition
    fn status_changes(&self) -> watch::Receiver<NetworkStatus>;
}

/// Network policy fed by the platform
#[derive(Debug)]
pub struct WatchedNetworkPolicy {
    status: watch::Sender<NetworkStatus>,
    settings: RwLock<DownloadSettings>,
}

impl WatchedNetworkPolicy {
    pub fn new(status: NetworkStatus, settings: DownloadSettings) -> Self {
        let (tx, _rx) = watch::channel(status);
        Self {
            status: tx,
            settings: RwLock::new(settings),
        }
    }

    /// Record a connectivity change; subscribers are woken only on change
    pub fn set_status(&self, status: NetworkStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    pub fn set_settings(&self, settings: DownloadSettings) {
        *self.settings.write() = settings;
    }

    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }
}

impl Default for WatchedNetworkPolicy {
    fn default() -> Self {
        Self::new(NetworkStatus::wifi(), DownloadSettings::default())
    }
}

#[async_trait]
impl NetworkPolicy for WatchedNetworkPolicy {
    async fn is_online(&self) -> bool {
        self.status.borrow().online
    }

    async fn is_wifi(&self) -> bool {
        self.status.borrow().is_wifi()
    }

    async fn settings(&self) -> DownloadSettings {
        *self.settings.read()
    }

    fn status_changes(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }
}
