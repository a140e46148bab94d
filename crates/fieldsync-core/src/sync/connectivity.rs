//! Online/offline signal

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

/// Publishes connectivity transitions to any number of subscribers
#[derive(Debug)]
pub struct Connectivity {
    sender: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Publish the current state; subscribers only wake on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            debug!(online, "Connectivity changed");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// A receiver observing every later transition
    pub fn signal(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Whether `url` answers at all within `timeout`. Any HTTP status counts as reachable.
pub async fn probe(url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(error) => {
            debug!("Failed to build probe client: {error}");
            return false;
        }
    };

    match client.get(url).send().await {
        Ok(response) => {
            debug!(status = %response.status(), "Probe answered");
            true
        }
        Err(error) => {
            debug!("Probe failed: {error}");
            false
        }
    }
}
