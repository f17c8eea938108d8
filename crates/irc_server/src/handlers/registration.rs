//! PASS / NICK / USER / QUIT — connection registration and teardown (RFC 2812 3.1).

use std::sync::Arc;

use log::info;

use crate::constants::{SERVER_VERSION, USER_MODES_SUPPORTED};
use crate::errors::HandlerError;
use crate::fanout::deliver_once_to_shared_channel_members;
use crate::handlers::{HandlerContext, HandlerResult, require_param, require_registered};
use crate::message::Message;
use crate::parsers::nickname_parser;
use crate::replies::IrcReply;
use crate::state::{ClientRecord, WhowasEntry};

pub async fn handle_pass(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    let password = require_param(&msg.params, 0, "PASS")?;
    *client.password.write().await = Some(password.to_string());
    Ok(())
}

pub async fn handle_nick(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    let requested = msg.params.first().map(String::as_str).unwrap_or_default();
    if requested.is_empty() {
        return Err(HandlerError::NoNicknameGiven);
    }
    let well_formed = nickname_parser(requested)
        .map(|(rest, _)| rest.is_empty())
        .unwrap_or(false);
    if !well_formed {
        // The numeric table this server emits has no ERR_ERRONEUSNICKNAME; a malformed nick is
        // rejected the same way a taken one is.
        return Err(HandlerError::NicknameInUse(requested.to_string()));
    }

    let previous = client.current_nick().await;
    if !ctx.state.try_claim_nick(client.id, requested, previous.as_deref()) {
        return Err(HandlerError::NicknameInUse(requested.to_string()));
    }

    let was_registered = client.is_registered();
    *client.nick.write().await = Some(requested.to_string());

    if was_registered {
        let user = client.user.read().await.clone().unwrap_or_default();
        let line = format!(
            ":{}!{user}@{} NICK :{requested}",
            previous.unwrap_or_else(|| "*".into()),
            client.addr.ip(),
        );
        deliver_once_to_shared_channel_members(&ctx.state, client.id, &line, false).await;
    } else if client.mark_registered_if_ready().await {
        send_welcome_burst(ctx, client).await;
    }
    Ok(())
}

pub async fn handle_user(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    let username = require_param(&msg.params, 0, "USER")?;
    let realname = msg.trailing.clone().unwrap_or_else(|| username.to_string());

    if client.is_registered() {
        return Err(HandlerError::UsersDontMatch);
    }

    *client.user.write().await = Some(username.to_string());
    *client.realname.write().await = Some(realname);

    if client.mark_registered_if_ready().await {
        send_welcome_burst(ctx, client).await;
    }
    Ok(())
}

pub async fn handle_quit(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    let reason = msg.trailing.clone().unwrap_or_else(|| "Client Quit".to_string());
    teardown_client(ctx, client, &reason).await;
    Ok(())
}

/// Shared teardown path for an explicit QUIT and for an abrupt socket close (the reader task
/// hitting EOF), so both leave channels and the client table in the same state. Idempotent: a
/// second call for an already-removed client id is a harmless no-op.
pub async fn teardown_client(ctx: &HandlerContext, client: &Arc<ClientRecord>, reason: &str) {
    if ctx.state.get_client(client.id).is_none() {
        return;
    }
    let nick = client.current_nick().await.unwrap_or_else(|| "*".into());
    let user = client.user.read().await.clone().unwrap_or_default();
    let realname = client.realname.read().await.clone().unwrap_or_default();
    let host = client.addr.ip().to_string();

    let quit_line = format!(":{nick}!{user}@{host} QUIT :{reason}");
    deliver_once_to_shared_channel_members(&ctx.state, client.id, &quit_line, true).await;

    let member_channels: Vec<String> = client.channels.iter().map(|c| c.clone()).collect();
    for channel_name in member_channels {
        if let Some(channel) = ctx.state.get_channel(&channel_name) {
            channel.remove_member(client.id).await;
            ctx.state.remove_channel_if_empty(&channel_name);
        }
    }

    if !nick.is_empty() && nick != "*" {
        ctx.state.record_whowas(WhowasEntry {
            nick: nick.clone(),
            user,
            host,
            realname,
            seen_at: now_unix(),
        });
    }

    ctx.state.remove_client(client.id);
    client.request_shutdown();
    info!("[{}] disconnected: {reason}", client.id);
}

async fn send_welcome_burst(ctx: &HandlerContext, client: &Arc<ClientRecord>) {
    let nick = client.current_nick().await.unwrap_or_default();
    let user = client.user.read().await.clone().unwrap_or_default();
    let host = client.addr.ip().to_string();
    let server_name = ctx.config.server.name.clone();

    let replies = [
        IrcReply::Welcome { nick: nick.clone(), user, host },
        IrcReply::YourHost { nick: nick.clone(), server_version: SERVER_VERSION.to_string() },
        IrcReply::Created { nick: nick.clone(), date: "today".to_string() },
        IrcReply::MyInfo { nick, modes: USER_MODES_SUPPORTED.to_string() },
    ];
    for reply in &replies {
        client.send_line(reply.format(&server_name)).await;
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
    use crate::handlers::channel::handle_join;
    use crate::handlers::test_support::{registered_client, test_config};
    use crate::state::ServerState;

    /// Scenario 2 (§8): NICK to a name another live client already holds is rejected with
    /// 433, and the requester keeps its old identity.
    #[tokio::test]
    async fn nick_collision_is_rejected() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let ctx = HandlerContext { state: state.clone(), config: test_config() };
        let alice = registered_client(&state, "alice", 1).await;
        let bob = registered_client(&state, "bob", 2).await;

        let result = handle_nick(&ctx, &bob.client, &Message::new("NICK").with_param("alice")).await;
        assert!(matches!(result, Err(HandlerError::NicknameInUse(_))));
        assert_eq!(bob.client.current_nick().await, Some("bob".to_string()));
        assert_eq!(alice.client.current_nick().await, Some("alice".to_string()));
    }

    /// A bare NICK with no argument is ERR_NONICKNAMEGIVEN, not a collision error.
    #[tokio::test]
    async fn empty_nick_is_rejected_distinctly() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let result = handle_nick(&ctx, &alice.client, &Message::new("NICK")).await;
        assert!(matches!(result, Err(HandlerError::NoNicknameGiven)));
    }

    /// A NICK change is delivered exactly once to a recipient who shares more than one
    /// channel with the renaming client, never once per shared channel.
    #[tokio::test]
    async fn nick_change_is_deduplicated_across_shared_channels() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let ctx = HandlerContext { state: state.clone(), config: test_config() };
        let alice = registered_client(&state, "alice", 1).await;
        let mut bob = registered_client(&state, "bob", 2).await;

        for chan in ["#a", "#b"] {
            handle_join(&ctx, &alice.client, &Message::new("JOIN").with_param(chan)).await.unwrap();
            handle_join(&ctx, &bob.client, &Message::new("JOIN").with_param(chan)).await.unwrap();
        }
        bob.drain();

        handle_nick(&ctx, &alice.client, &Message::new("NICK").with_param("alice2")).await.unwrap();

        let lines = bob.drain();
        let nick_lines: Vec<_> = lines.iter().filter(|l| l.contains("NICK :alice2")).collect();
        assert_eq!(nick_lines.len(), 1, "expected exactly one NICK line, got: {lines:?}");
    }

    /// A QUIT is likewise delivered exactly once to a recipient sharing two channels with the
    /// departing client, and membership is fully torn down afterward.
    #[tokio::test]
    async fn quit_is_deduplicated_across_shared_channels_and_tears_down_membership() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let ctx = HandlerContext { state: state.clone(), config: test_config() };
        let alice = registered_client(&state, "alice", 1).await;
        let mut bob = registered_client(&state, "bob", 2).await;

        for chan in ["#a", "#b"] {
            handle_join(&ctx, &alice.client, &Message::new("JOIN").with_param(chan)).await.unwrap();
            handle_join(&ctx, &bob.client, &Message::new("JOIN").with_param(chan)).await.unwrap();
        }
        bob.drain();

        teardown_client(&ctx, &alice.client, "Ping timeout").await;

        let lines = bob.drain();
        let quit_lines: Vec<_> = lines.iter().filter(|l| l.contains("QUIT :Ping timeout")).collect();
        assert_eq!(quit_lines.len(), 1, "expected exactly one QUIT line, got: {lines:?}");
        assert!(ctx.state.get_client(alice.client.id).is_none());
        assert!(ctx.state.find_by_nick("alice").is_none());
        for chan in ["#a", "#b"] {
            let channel = ctx.state.get_channel(chan).unwrap();
            assert!(!channel.members.contains(&alice.client.id));
        }
    }

    /// Calling teardown twice for the same client (an explicit QUIT racing a reader EOF) is a
    /// harmless no-op the second time.
    #[tokio::test]
    async fn teardown_is_idempotent() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        teardown_client(&ctx, &alice.client, "bye").await;
        teardown_client(&ctx, &alice.client, "bye again").await;
        assert!(ctx.state.get_client(alice.client.id).is_none());
    }

    /// Scenario 1 (§8): the welcome burst is sent in 001-004 order, once USER completes
    /// registration after NICK.
    #[tokio::test]
    async fn welcome_burst_is_sent_in_numeric_order_once_registration_completes() {
        let ctx = crate::handlers::test_support::test_context();
        let id = ctx.state.next_client_id();
        let addr: std::net::SocketAddr = "127.0.0.1:3".parse().unwrap();
        let (tx_o, mut rx_o, tx_c, _rx_c) = crate::state::store::new_connection_channels();
        let client = ClientRecord::new(id, addr, tx_o, tx_c, 0);
        ctx.state.insert_client(client.clone());

        handle_nick(&ctx, &client, &Message::new("NICK").with_param("alice")).await.unwrap();
        assert!(rx_o.try_recv().is_err(), "no welcome burst before USER completes registration");

        handle_user(&ctx, &client, &Message::new("USER").with_param("alice").with_trailing("Alice Real"))
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx_o.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines.len(), 4, "{lines:?}");
        assert!(lines[0].contains(" 001 "));
        assert!(lines[1].contains(" 002 "));
        assert!(lines[2].contains(" 003 "));
        assert!(lines[3].contains(" 004 "));
    }
}

const KNOWN_USER_MODES: &str = "aiwroOs";

/// User MODE: query form (`MODE nick`) and `+/-aiwroOs` self-flags. A client may only change
/// its own modes (RFC 2812 3.1.5); targeting another nick is ERR_USERSDONTMATCH.
pub async fn handle_user_mode(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let target_nick = require_param(&msg.params, 0, "MODE")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    if !nick.eq_ignore_ascii_case(target_nick) {
        return Err(HandlerError::UsersDontMatch);
    }

    let Some(flags) = msg.params.get(1) else {
        let modes: String = client.modes.read().await.iter().collect();
        client
            .send_line(IrcReply::UModeIs { nick, modes }.format(&server_name))
            .await;
        return Ok(());
    };

    let mut sign = '+';
    for flag in flags.chars() {
        match flag {
            '+' | '-' => sign = flag,
            c if KNOWN_USER_MODES.contains(c) => {
                let mut modes = client.modes.write().await;
                if sign == '+' {
                    modes.insert(c);
                } else {
                    modes.remove(&c);
                }
            }
            _ => return Err(HandlerError::UModeUnknownFlag),
        }
    }
    Ok(())
}
