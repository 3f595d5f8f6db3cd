//! Connectivity monitor fed by the host application

use tipsync_core::ConnectivityMonitor;
use tokio::sync::watch;
use tracing::debug;

/// Holds the current online flag. Platform glue calls [`set_online`] when
/// the network state changes.
///
/// [`set_online`]: WatchConnectivity::set_online
#[derive(Debug)]
pub struct WatchConnectivity {
    state: watch::Sender<bool>,
}

impl WatchConnectivity {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    /// Update the flag. Subscribers are only woken on an actual transition.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            debug!(online, "connectivity flag updated");
        }
    }
}

impl Default for WatchConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for WatchConnectivity {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_online() {
        assert!(WatchConnectivity::default().is_online());
    }

    #[tokio::test]
    async fn subscribers_see_transitions_only() {
        let monitor = WatchConnectivity::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(!rx.has_changed().expect("sender alive"));

        monitor.set_online(false);
        rx.changed().await.expect("sender alive");
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());
    }
}
