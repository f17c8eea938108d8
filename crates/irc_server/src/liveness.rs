//! The liveness supervisor (C7): two independent timers — one issuing PINGs, one sweeping idle
//! connections — running for the lifetime of the server rather than per-connection.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::config::Config;
use crate::handlers::HandlerContext;
use crate::handlers::registration::teardown_client;
use crate::state::ServerState;

/// A fresh opaque token for one outstanding PING, unguessable enough that a stray PONG left
/// over from a previous round trip can't be mistaken for a reply to this one.
fn generate_ping_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect()
}

/// Starts both timers and returns their join handles; the caller holds these open for the
/// server's lifetime (they are never expected to finish on their own).
pub fn spawn(state: Arc<ServerState>, config: Arc<Config>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let ping_task = tokio::spawn(run_ping_issuer(state.clone(), config.clone()));
    let sweep_task = tokio::spawn(run_idle_sweep(state, config));
    (ping_task, sweep_task)
}

/// Every `ping_interval_secs`, pings every registered client that doesn't already have one
/// outstanding. A client already marked AWAITING-PONG is left alone; the sweep, not this timer,
/// is what eventually evicts it.
async fn run_ping_issuer(state: Arc<ServerState>, config: Arc<Config>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.liveness.ping_interval_secs));
    loop {
        ticker.tick().await;
        let now = now_unix();
        for id in state.all_client_ids() {
            let Some(client) = state.get_client(id) else { continue };
            if !client.is_registered() {
                continue;
            }
            let mut pending = client.pending_ping_since.write().await;
            if pending.is_some() {
                continue;
            }
            let token = generate_ping_token();
            *pending = Some(now);
            *client.pending_ping_token.write().await = Some(token.clone());
            drop(pending);
            client.send_line(format!(":{} PING :{token}", config.server.name)).await;
        }
    }
}

/// Every `sweep_interval_secs`, evicts any client whose last activity (any line read, a PONG
/// included) is older than `idle_bound_secs`. Tears the client down the same way QUIT does and
/// wakes its connection task so the socket actually closes.
async fn run_idle_sweep(state: Arc<ServerState>, config: Arc<Config>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.liveness.sweep_interval_secs));
    let ctx = HandlerContext { state: state.clone(), config: config.clone() };
    loop {
        ticker.tick().await;
        let now = now_unix();
        for id in state.all_client_ids() {
            let Some(client) = state.get_client(id) else { continue };
            let idle = client.idle_for(now);
            if idle >= config.liveness.idle_bound_secs {
                info!("[{id}] evicted: idle for {idle}s");
                teardown_client(&ctx, &client, "Ping timeout").await;
            }
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{registered_client, test_config};
    use crate::state::ServerState;

    /// The ping issuer pings a registered client once per tick and leaves it alone on the next
    /// tick while a PONG is still outstanding, per the "one outstanding PING at a time" rule.
    #[tokio::test(start_paused = true)]
    async fn ping_issuer_pings_once_then_waits_for_the_outstanding_reply() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let config = test_config();
        let mut alice = registered_client(&state, "alice", 1).await;

        tokio::spawn(run_ping_issuer(state.clone(), config.clone()));

        tokio::time::advance(Duration::from_secs(config.liveness.ping_interval_secs) + Duration::from_millis(1))
            .await;
        tokio::task::yield_now().await;
        let lines = alice.drain();
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("PING :"));
        assert!(alice.client.pending_ping_token.read().await.is_some());

        tokio::time::advance(Duration::from_secs(config.liveness.ping_interval_secs) + Duration::from_millis(1))
            .await;
        tokio::task::yield_now().await;
        assert!(alice.drain().is_empty(), "no second PING while one is still outstanding");
    }

    /// The idle sweep evicts a client once its last activity is older than `idle_bound_secs`,
    /// tearing it down the same way an explicit QUIT would. `idle_for` is measured against real
    /// wall-clock seconds (not the paused virtual clock the ticker itself runs on), so the test
    /// back-dates `last_activity` directly rather than relying on advancing virtual time to age
    /// it — advancing the ticker only controls when the sweep next looks, not what it computes.
    #[tokio::test(start_paused = true)]
    async fn idle_sweep_evicts_clients_past_the_idle_bound() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let config = test_config();
        let alice = registered_client(&state, "alice", 1).await;
        let id = alice.client.id;
        let stale = now_unix().saturating_sub(config.liveness.idle_bound_secs + 1);
        alice.client.touch(stale);

        tokio::spawn(run_idle_sweep(state.clone(), config.clone()));
        // The sweep's first tick fires immediately on creation; let it run.
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        assert!(state.get_client(id).is_none(), "idle client should have been evicted");
    }

    /// A client whose last activity is recent is left alone across a sweep tick.
    #[tokio::test(start_paused = true)]
    async fn idle_sweep_leaves_recently_active_clients_alone() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let config = test_config();
        let alice = registered_client(&state, "alice", 1).await;
        let id = alice.client.id;
        alice.client.touch(now_unix());

        tokio::spawn(run_idle_sweep(state.clone(), config.clone()));
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        assert!(state.get_client(id).is_some(), "recently active client should not be evicted");
    }
}
