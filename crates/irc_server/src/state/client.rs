//! Per-connection state: identity, registration progress, modes, channel membership.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashSet;
use tokio::sync::{Notify, RwLock, mpsc};

use crate::state::channel::ChannelEvent;

/// Identifies a connection for the lifetime of the process. Never reused.
pub type ClientId = usize;

/// Control messages the connection handler sends to its own writer task to manage which
/// channel broadcast buses it is currently draining.
pub enum SubscriptionControl {
    Subscribe {
        channel: String,
        receiver: tokio::sync::broadcast::Receiver<ChannelEvent>,
    },
    Unsubscribe(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationPhase {
    /// Connected, but PASS/NICK/USER have not all landed yet.
    Handshaking,
    /// Nick and user both set; the welcome burst has been sent.
    Registered,
    /// QUIT received or the socket is tearing down; kept around only for cleanup.
    Closing,
}

/// Mutable per-client fields, guarded individually so a slow write doesn't block state-store
/// operations for unrelated clients (the coarse lock in `store.rs` is never held across I/O).
#[derive(Debug)]
pub struct ClientRecord {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub nick: RwLock<Option<String>>,
    pub user: RwLock<Option<String>>,
    pub realname: RwLock<Option<String>>,
    pub password: RwLock<Option<String>>,
    pub away_message: RwLock<Option<String>>,
    pub modes: RwLock<HashSet<char>>,
    pub phase: RwLock<RegistrationPhase>,
    pub registered: AtomicBool,
    /// Unix timestamp (seconds) of the last line read from the socket. Updated by the reader
    /// task; read by the liveness sweeper.
    pub last_activity: AtomicU64,
    /// Unix timestamp (seconds) of the last PING issued to this client without a PONG yet.
    pub pending_ping_since: RwLock<Option<u64>>,
    /// The opaque token handed out with that PING; a PONG must echo it back before the
    /// AWAITING-PONG liveness state clears (a stray PONG with a stale or wrong token is ignored).
    pub pending_ping_token: RwLock<Option<String>>,
    pub channels: DashSet<String>,
    pub tx_outbound: mpsc::Sender<String>,
    pub tx_control: mpsc::Sender<SubscriptionControl>,
    /// Wakes the connection's reader loop for a server-initiated close (KILL, idle eviction)
    /// that does not originate from the socket itself.
    pub shutdown: Notify,
}

impl ClientRecord {
    pub fn new(
        id: ClientId,
        addr: SocketAddr,
        tx_outbound: mpsc::Sender<String>,
        tx_control: mpsc::Sender<SubscriptionControl>,
        now: u64,
    ) -> Arc<Self> {
        Arc::new(ClientRecord {
            id,
            addr,
            nick: RwLock::new(None),
            user: RwLock::new(None),
            realname: RwLock::new(None),
            password: RwLock::new(None),
            away_message: RwLock::new(None),
            modes: RwLock::new(HashSet::new()),
            phase: RwLock::new(RegistrationPhase::Handshaking),
            registered: AtomicBool::new(false),
            last_activity: AtomicU64::new(now),
            pending_ping_since: RwLock::new(None),
            pending_ping_token: RwLock::new(None),
            channels: DashSet::new(),
            tx_outbound,
            tx_control,
            shutdown: Notify::new(),
        })
    }

    /// Signals the connection's reader loop to stop without waiting for the socket to produce
    /// more input. Safe to call more than once; `Notify::notify_one` on an already-woken waiter
    /// is a harmless no-op permit.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn touch(&self, now: u64) {
        self.last_activity.store(now, Ordering::Relaxed);
    }

    pub fn idle_for(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_activity.load(Ordering::Relaxed))
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// A user becomes registered the instant both NICK and USER have landed; this is the one
    /// shared state transition both handlers can race on, so it lives behind the write lock
    /// on `phase` rather than relying on two independent `Option` checks.
    pub async fn mark_registered_if_ready(&self) -> bool {
        if self.registered.load(Ordering::Acquire) {
            return false;
        }
        let has_nick = self.nick.read().await.is_some();
        let has_user = self.user.read().await.is_some();
        if !has_nick || !has_user {
            return false;
        }
        let mut phase = self.phase.write().await;
        if *phase == RegistrationPhase::Registered {
            return false;
        }
        *phase = RegistrationPhase::Registered;
        self.registered.store(true, Ordering::Release);
        true
    }

    pub async fn current_nick(&self) -> Option<String> {
        self.nick.read().await.clone()
    }

    /// `nick!user@host`, falling back to `*` for any field not yet known — used before
    /// registration completes, e.g. to format an early error reply.
    pub async fn hostmask(&self) -> String {
        let nick = self.nick.read().await.clone().unwrap_or_else(|| "*".into());
        let user = self.user.read().await.clone().unwrap_or_else(|| "*".into());
        format!("{nick}!{user}@{}", self.addr.ip())
    }

    /// Sends a pre-serialized line directly to this client's writer task. Never blocks past
    /// the channel's buffer: a full outbound queue indicates a stalled client, not a reason to
    /// stall the caller (a handler holding no locks across this call, or the liveness sweeper).
    pub async fn send_line(&self, line: String) {
        let _ = self.tx_outbound.send(line).await;
    }
}

/// Canonicalizes a nickname for case-insensitive lookup and comparison, per RFC 2812 2.2 (the
/// characters `{}|^` are the lower-case counterparts of `[]\~`).
pub fn canonicalize_nick(nick: &str) -> String {
    nick.chars()
        .map(|c| match c {
            '{' => '[',
            '}' => ']',
            '|' => '\\',
            '^' => '~',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_case_insensitive() {
        assert_eq!(canonicalize_nick("Alice"), canonicalize_nick("alice"));
        assert_eq!(canonicalize_nick("ALICE"), canonicalize_nick("alice"));
    }

    #[test]
    fn canonicalize_maps_special_chars() {
        assert_eq!(canonicalize_nick("a{b}c|d^"), "A[B]C\\D~");
    }
}
