//! IP multicast beacon announcer.
//!
//! New agents discover the Manager by listening on a well-known multicast
//! group; this module only sends the beacon. Peer tracking, acks, and
//! registration handshakes are the agent's responsibility and are out of
//! scope here.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Serialize)]
struct Beacon<'a> {
    manager_url: &'a str,
}

/// Periodically broadcasts the Manager's reachable URL to a multicast
/// group so agents can find it without prior configuration.
pub struct MulticastAnnouncer {
    group_addr: String,
    port: u16,
    interval: Duration,
    manager_url: String,
    running: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl MulticastAnnouncer {
    /// Creates an announcer for `manager_url`, broadcasting to
    /// `group_addr:port` every `interval`.
    #[must_use]
    pub fn new(group_addr: impl Into<String>, port: u16, interval: Duration, manager_url: impl Into<String>) -> Self {
        Self {
            group_addr: group_addr.into(),
            port,
            interval,
            manager_url: manager_url.into(),
            running: Arc::new(AtomicBool::new(false)),
            join: Mutex::new(None),
        }
    }

    /// Starts the announce loop on a dedicated thread. No-op if already
    /// running.
    pub fn start(self: &Arc<Self>) {
        let mut join = self.join.lock().expect("multicast announcer join mutex poisoned");
        if join.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("multicast-announcer".to_string())
            .spawn(move || this.run())
            .expect("failed to spawn multicast announcer thread");
        *join = Some(handle);
    }

    fn run(&self) {
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "failed to bind multicast announcer socket");
                return;
            }
        };
        if let Err(err) = socket.set_broadcast(true) {
            warn!(error = %err, "failed to enable broadcast on multicast socket");
        }

        let target = format!("{}:{}", self.group_addr, self.port);
        let payload = serde_json::to_vec(&Beacon {
            manager_url: &self.manager_url,
        })
        .unwrap_or_default();

        info!(target = %target, interval_s = self.interval.as_secs(), "multicast announcer started");
        while self.running.load(Ordering::SeqCst) {
            if let Err(err) = socket.send_to(&payload, &target) {
                warn!(error = %err, "failed to send multicast beacon");
            }
            thread::sleep(self.interval);
        }
        info!("multicast announcer stopped");
    }

    /// Signals the announce loop to stop and blocks until it has exited.
    /// Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut join = self.join.lock().expect("multicast announcer join mutex poisoned");
        if let Some(handle) = join.take() {
            let _ = handle.join();
        }
    }
}
