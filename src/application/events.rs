use tokio::sync::broadcast;

/// Advisory notifications emitted while the manager works. Everything here
/// is display material; no consumer decision may depend on receiving one.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// The available/installed catalogs changed.
    CatalogUpdated,
    /// The on-disk catalog snapshot was rewritten.
    CacheUpdated,
    /// Short human-readable progress line.
    Status(String),
    /// Byte-level progress of the transfer currently in flight.
    DownloadProgress {
        url: String,
        received: u64,
        total: Option<u64>,
    },
    /// Something failed in a way worth surfacing to the user.
    StatusError(String),
    /// An install was requested for a plugin whose repository assets are not
    /// in the local cache yet; a repository check must run first.
    DownloadRequired,
}

/// Broadcast fan-out for [`ManagerEvent`]. Cloneable; every subscriber gets
/// every event from the moment it subscribes.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<ManagerEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ManagerEvent) {
        // Send fails only when nobody is listening, which is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.publish(ManagerEvent::CatalogUpdated);
        notifier.publish(ManagerEvent::Status("checking".to_string()));

        assert!(matches!(rx.recv().await, Ok(ManagerEvent::CatalogUpdated)));
        assert!(matches!(rx.recv().await, Ok(ManagerEvent::Status(s)) if s == "checking"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let notifier = Notifier::default();
        notifier.publish(ManagerEvent::DownloadRequired);
        // A late subscriber sees only what comes after.
        let mut rx = notifier.subscribe();
        notifier.publish(ManagerEvent::CacheUpdated);
        assert!(matches!(rx.recv().await, Ok(ManagerEvent::CacheUpdated)));
    }
}
