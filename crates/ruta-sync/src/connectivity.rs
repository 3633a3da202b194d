//! # Connectivity Monitor
//!
//! Two-state machine (Online/Offline) with edge-triggered notification.
//!
//! ## State Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity State Machine                          │
//! │                                                                         │
//! │          set_online(true)                                              │
//! │    ┌──────────┐ ─────────────────────────► ┌──────────┐                │
//! │    │ OFFLINE  │                            │  ONLINE  │                │
//! │    └──────────┘ ◄───────────────────────── └──────────┘                │
//! │          set_online(false)                                             │
//! │                                                                         │
//! │  • Subscribers and watchers hear about EDGES only.                     │
//! │    set_online(true) while already online is a no-op.                   │
//! │  • The monitor never starts a sync. The auto-sync scheduler watches    │
//! │    it and decides.                                                     │
//! │  • spawn_http_probe() is one way to feed it; the host OS network       │
//! │    callback is another.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observer::{Observers, Subscription};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reachability of the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn from_online(online: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

/// Shared handle to the device's connectivity state. Cheap to clone.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityState>>,
    observers: Observers<ConnectivityState>,
}

impl ConnectivityMonitor {
    /// Creates a monitor in the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(ConnectivityState::from_online(online));
        ConnectivityMonitor {
            tx: Arc::new(tx),
            observers: Observers::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Records the latest observation.
    ///
    /// ## Returns
    /// `true` if this was a transition (and subscribers were notified).
    pub fn set_online(&self, online: bool) -> bool {
        let next = ConnectivityState::from_online(online);
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        if changed {
            info!(state = %next, "Connectivity changed");
            self.observers.notify(&next);
        }
        changed
    }

    /// Registers a callback fired on every transition.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectivityState) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Async view of the state, for tasks that `select!` on transitions.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.state())
            .field("subscribers", &self.observers.len())
            .finish()
    }
}

/// Polls `health_url` every `interval` and feeds the result into `monitor`.
///
/// Any 2xx answer counts as online; errors, timeouts and other statuses
/// count as offline. Abort the returned handle to stop probing.
pub fn spawn_http_probe(
    monitor: ConnectivityMonitor,
    health_url: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Connectivity probe disabled: HTTP client unavailable");
                return;
            }
        };

        info!(url = %health_url, ?interval, "Connectivity probe started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            monitor.set_online(check(&client, &health_url).await);
        }
    })
}

/// Probes `health_url` once. Used to seed the monitor at startup.
pub async fn probe_once(health_url: &str) -> bool {
    match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => check(&client, health_url).await,
        Err(e) => {
            warn!(error = %e, "Connectivity probe unavailable");
            false
        }
    }
}

async fn check(client: &reqwest::Client, health_url: &str) -> bool {
    match client.get(health_url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            debug!(error = %e, "Health probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_transitions_are_edge_triggered() {
        let monitor = ConnectivityMonitor::new(false);
        let edges = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&edges);
        let _sub = monitor.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!monitor.set_online(false));
        assert!(monitor.set_online(true));
        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));

        assert_eq!(edges.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.state(), ConnectivityState::Offline);
    }

    #[test]
    fn test_clones_share_state() {
        let monitor = ConnectivityMonitor::new(true);
        let clone = monitor.clone();
        clone.set_online(false);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_watch_sees_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.watch();

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectivityState::Online);
    }

    #[tokio::test]
    async fn test_http_probe_follows_health_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.watch();
        let probe = spawn_http_probe(
            monitor.clone(),
            format!("{}/health", server.uri()),
            Duration::from_millis(20),
        );

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(monitor.is_online());

        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(!monitor.is_online());

        probe.abort();
    }

    #[tokio::test]
    async fn test_probe_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(probe_once(&format!("{}/health", server.uri())).await);
        assert!(!probe_once(&format!("{}/missing", server.uri())).await);
    }
}
