//! PING / PONG / VERSION / STATS / LINKS / CAP — connection liveness and informational
//! commands that don't touch channel or messaging state.

use std::sync::Arc;

use crate::constants::SERVER_VERSION;
use crate::fanout::send_reply;
use crate::handlers::{HandlerContext, HandlerResult, require_registered};
use crate::message::Message;
use crate::replies::{IrcReply, cap_reply};
use crate::state::ClientRecord;

pub async fn handle_ping(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    let token = msg.params.first().cloned().unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    client.send_line(format!(":{server_name} PONG {server_name} :{token}")).await;
    Ok(())
}

/// A client's PONG proves liveness only if it echoes back the token this server's own PING
/// carried; a PONG with a stale or mismatched token is ignored for liveness purposes (§4.7) but
/// is not an error — the connection is left exactly as if nothing had arrived.
pub async fn handle_pong(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    let received = msg.params.first().or(msg.trailing.as_ref());
    let mut expected = client.pending_ping_token.write().await;
    if expected.as_deref().is_some() && expected.as_deref() == received.map(String::as_str) {
        *expected = None;
        drop(expected);
        *client.pending_ping_since.write().await = None;
    }
    Ok(())
}

pub async fn handle_version(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    send_reply(
        client,
        &server_name,
        &IrcReply::Version { nick, version: SERVER_VERSION.to_string() },
    )
    .await;
    Ok(())
}

pub async fn handle_stats(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let query = msg.params.first().cloned().unwrap_or_else(|| "*".to_string());
    send_reply(client, &server_name, &IrcReply::StatsLinkInfo { nick: nick.clone() }).await;
    send_reply(client, &server_name, &IrcReply::EndOfStats { nick, query }).await;
    Ok(())
}

/// This deployment has no server-to-server links; LINKS always reports the local server alone
/// and nothing else, matching a standalone (non-federated) topology.
pub async fn handle_links(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let mask = msg.params.first().cloned().unwrap_or_else(|| server_name.clone());
    send_reply(client, &server_name, &IrcReply::Links { nick: nick.clone(), mask: mask.clone() }).await;
    send_reply(client, &server_name, &IrcReply::EndOfLinks { nick, mask }).await;
    Ok(())
}

/// This server advertises no IRCv3 capabilities: every CAP subcommand gets an empty list and
/// the client is expected to fall back to plain NICK/USER registration.
pub async fn handle_cap(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    let subcommand = msg.params.first().map(String::as_str).unwrap_or("LS");
    let nick = client.current_nick().await.unwrap_or_else(|| "*".to_string());
    client.send_line(cap_reply(&nick, subcommand)).await;
    client.touch(now_unix());
    Ok(())
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
    use crate::handlers::test_support::registered_client;

    fn pong(token: &str) -> Message {
        Message::new("PONG").with_param(token)
    }

    /// A PONG that echoes the exact outstanding token clears both the token and the
    /// pending-since timestamp.
    #[tokio::test]
    async fn pong_with_matching_token_clears_liveness_state() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;
        *alice.client.pending_ping_token.write().await = Some("tok123".to_string());
        *alice.client.pending_ping_since.write().await = Some(42);

        handle_pong(&ctx, &alice.client, &pong("tok123")).await.unwrap();

        assert!(alice.client.pending_ping_token.read().await.is_none());
        assert!(alice.client.pending_ping_since.read().await.is_none());
    }

    /// A PONG carrying a stale or guessed token does not clear liveness state — it must not be
    /// mistaken for proof the client answered this server's most recent PING.
    #[tokio::test]
    async fn pong_with_mismatched_token_is_ignored() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;
        *alice.client.pending_ping_token.write().await = Some("tok123".to_string());
        *alice.client.pending_ping_since.write().await = Some(42);

        handle_pong(&ctx, &alice.client, &pong("wrong-token")).await.unwrap();

        assert_eq!(alice.client.pending_ping_token.read().await.as_deref(), Some("tok123"));
        assert_eq!(*alice.client.pending_ping_since.read().await, Some(42));
    }

    /// A PONG arriving when no PING is outstanding is a harmless no-op, not an error.
    #[tokio::test]
    async fn pong_with_no_outstanding_ping_is_a_no_op() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let result = handle_pong(&ctx, &alice.client, &pong("whatever")).await;
        assert!(result.is_ok());
        assert!(alice.client.pending_ping_token.read().await.is_none());
    }

    /// The server's PING echoes whatever token the client sent, per RFC 2812 3.7.2.
    #[tokio::test]
    async fn ping_echoes_the_clients_token() {
        let ctx = crate::handlers::test_support::test_context();
        let mut alice = registered_client(&ctx.state, "alice", 1).await;

        handle_ping(&ctx, &alice.client, &Message::new("PING").with_param("abc123")).await.unwrap();

        let lines = alice.drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("PONG mock.server :abc123"), "{lines:?}");
    }
}
