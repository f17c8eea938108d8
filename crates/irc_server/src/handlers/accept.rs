//! The "accepted-but-canned" command surface (§4.5/§6): verbs that must not fall through to
//! ERR_UNKNOWNCOMMAND but carry no real server-to-server or account state in this deployment.
//! AWAY, OPER and KILL are the exceptions — they drive real fields on the client record (the
//! away message, the operator user-mode, and teardown of another connection).

use std::sync::Arc;

use crate::errors::HandlerError;
use crate::fanout::send_reply;
use crate::handlers::registration::teardown_client;
use crate::handlers::{HandlerContext, HandlerResult, require_param, require_registered};
use crate::message::Message;
use crate::replies::IrcReply;
use crate::state::ClientRecord;

async fn is_operator(client: &ClientRecord) -> bool {
    client.modes.read().await.contains(&'o')
}

/// Fails with ERR_NOPRIVILEGES unless the caller already holds the operator user-mode set by
/// a prior OPER.
async fn require_operator(client: &ClientRecord) -> Result<(), HandlerError> {
    if is_operator(client).await {
        Ok(())
    } else {
        Err(HandlerError::NoPrivileges)
    }
}

/// `AWAY [:message]` — a trailing-less call clears the away status (RFC 2812 4.1).
pub async fn handle_away(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    match &msg.trailing {
        Some(text) if !text.is_empty() => {
            *client.away_message.write().await = Some(text.clone());
            send_reply(client, &server_name, &IrcReply::NowAway { nick }).await;
        }
        _ => {
            *client.away_message.write().await = None;
            send_reply(client, &server_name, &IrcReply::UnAway { nick }).await;
        }
    }
    Ok(())
}

/// `OPER name password` — the only privilege escalation this core implements: a name/password
/// pair checked against `config.operators`, not a credential database (spec non-goal).
pub async fn handle_oper(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let name = require_param(&msg.params, 0, "OPER")?;
    let password = require_param(&msg.params, 1, "OPER")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    let matches = ctx
        .config
        .operators
        .iter()
        .any(|cred| cred.name == name && cred.password == password);
    if !matches {
        return Err(HandlerError::PasswdMismatch);
    }

    client.modes.write().await.insert('o');
    send_reply(client, &server_name, &IrcReply::YoureOper { nick }).await;
    Ok(())
}

/// `KILL nick [:reason]` — the one destructive accept-only verb wired to real behavior: it
/// runs the same teardown path as QUIT against another client's connection.
pub async fn handle_kill(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await?;
    let target_nick = require_param(&msg.params, 0, "KILL")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let reason = msg.trailing.clone().unwrap_or_else(|| "Killed".to_string());

    let target = ctx
        .state
        .find_by_nick(target_nick)
        .ok_or_else(|| HandlerError::NoSuchNick(target_nick.to_string()))?;
    let full_reason = format!("Killed by {nick}: {reason}");
    teardown_client(ctx, &target, &full_reason).await;
    Ok(())
}

/// REHASH requires operator status but this core has no config to reload at runtime beyond
/// startup; it only acknowledges the request.
pub async fn handle_rehash(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await?;
    let nick = client.current_nick().await.unwrap_or_default();
    send_reply(client, &ctx.config.server.name, &IrcReply::Rehashing { nick }).await;
    Ok(())
}

/// DIE / RESTART: destructive by name, but this core never tears down the process on a client
/// command — operator status gates the reply, the server keeps running.
pub async fn handle_die(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await
}

pub async fn handle_restart(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await
}

/// CONNECT / SQUIT: accepted, operator-gated, but this deployment never federates (spec
/// non-goal), so the canned reply is always "no such server".
pub async fn handle_connect(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server = msg.params.first().cloned().unwrap_or_default();
    send_reply(client, &ctx.config.server.name, &IrcReply::ErrNoSuchServer { nick, server }).await;
    Ok(())
}

pub async fn handle_squit(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server = msg.params.first().cloned().unwrap_or_default();
    send_reply(client, &ctx.config.server.name, &IrcReply::ErrNoSuchServer { nick, server }).await;
    Ok(())
}

/// WALLOPS requires the `+w` flag on the recipient and operator status on the sender; it
/// fans out to every connected client that opted in, not just channel members.
pub async fn handle_wallops(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await?;
    let nick = client.current_nick().await.unwrap_or_default();
    let user = client.user.read().await.clone().unwrap_or_default();
    let text = msg.trailing.clone().unwrap_or_default();
    let line = format!(":{nick}!{user}@{} WALLOPS :{text}", client.addr.ip());

    for id in ctx.state.all_client_ids() {
        if let Some(recipient) = ctx.state.get_client(id) {
            if recipient.modes.read().await.contains(&'w') {
                recipient.send_line(line.clone()).await;
            }
        }
    }
    Ok(())
}

/// `USERHOST nick1 [nick2 ...]` — up to 5 entries, RFC 2812 3.6.3.
pub async fn handle_userhost(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let mut entries = Vec::new();
    for requested in msg.params.iter().take(5) {
        let Some(target) = ctx.state.find_by_nick(requested) else { continue };
        let target_nick = target.current_nick().await.unwrap_or_default();
        let target_user = target.user.read().await.clone().unwrap_or_default();
        let is_op = target.modes.read().await.contains(&'o');
        let is_away = target.away_message.read().await.is_some();
        let away_flag = if is_away { '-' } else { '+' };
        let op_flag = if is_op { "*" } else { "" };
        entries.push(format!(
            "{target_nick}{op_flag}={away_flag}{target_user}@{}",
            target.addr.ip()
        ));
    }
    send_reply(client, &server_name, &IrcReply::UserHost { nick, entries }).await;
    Ok(())
}

/// `ISON nick1 nick2 ...` — which of the requested nicks are currently connected.
pub async fn handle_ison(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let mut present = Vec::new();
    for requested in &msg.params {
        if let Some(target) = ctx.state.find_by_nick(requested) {
            present.push(target.current_nick().await.unwrap_or_default());
        }
    }
    send_reply(client, &server_name, &IrcReply::IsOn { nick, present }).await;
    Ok(())
}

pub async fn handle_summon(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    send_reply(client, &ctx.config.server.name, &IrcReply::ErrSummonDisabled { nick }).await;
    Ok(())
}

pub async fn handle_users(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    send_reply(client, &ctx.config.server.name, &IrcReply::ErrUsersDisabled { nick }).await;
    Ok(())
}

pub async fn handle_servlist(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    send_reply(client, &ctx.config.server.name, &IrcReply::ServListEnd { nick }).await;
    Ok(())
}

/// SQUERY addresses a service by nickname; this deployment hosts none.
pub async fn handle_squery(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let target = require_param(&msg.params, 0, "SQUERY")?;
    Err(HandlerError::NoSuchNick(target.to_string()))
}

pub async fn handle_service(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    require_operator(client).await?;
    Ok(())
}

/// A client sending ERROR is unusual but must not be rejected as unknown; there is nothing to
/// do with it server-side.
pub async fn handle_error(
    _ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    Ok(())
}

pub async fn handle_admin(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    send_reply(client, &server_name, &IrcReply::AdminMe { nick: nick.clone(), server: server_name.clone() }).await;
    send_reply(client, &server_name, &IrcReply::AdminLoc1 { nick: nick.clone(), text: ctx.config.server.motd.clone() }).await;
    send_reply(client, &server_name, &IrcReply::AdminLoc2 { nick: nick.clone(), text: "Administered by the server operators".to_string() }).await;
    send_reply(client, &server_name, &IrcReply::AdminEmail { nick, text: "admin@localhost".to_string() }).await;
    Ok(())
}

pub async fn handle_info(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    send_reply(client, &server_name, &IrcReply::Info { nick: nick.clone(), text: ctx.config.server.version.clone() }).await;
    send_reply(client, &server_name, &IrcReply::EndOfInfo { nick }).await;
    Ok(())
}

pub async fn handle_time(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    send_reply(
        client,
        &server_name,
        &IrcReply::Time { nick, server: server_name.clone(), time: now.to_string() },
    )
    .await;
    Ok(())
}

pub async fn handle_motd(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    send_reply(client, &server_name, &IrcReply::MotdStart { nick: nick.clone(), server: server_name.clone() }).await;
    send_reply(client, &server_name, &IrcReply::Motd { nick: nick.clone(), line: ctx.config.server.motd.clone() }).await;
    send_reply(client, &server_name, &IrcReply::EndOfMotd { nick }).await;
    Ok(())
}

pub async fn handle_lusers(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    _msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let total = ctx.state.client_count();
    let mut ops = 0usize;
    for id in ctx.state.all_client_ids() {
        if let Some(c) = ctx.state.get_client(id) {
            if c.modes.read().await.contains(&'o') {
                ops += 1;
            }
        }
    }
    let channels = ctx.state.all_channels().len();

    send_reply(client, &server_name, &IrcReply::LuserClient { nick: nick.clone(), users: total }).await;
    send_reply(client, &server_name, &IrcReply::LuserOp { nick: nick.clone(), ops }).await;
    send_reply(client, &server_name, &IrcReply::LuserUnknown { nick: nick.clone(), unknown: 0 }).await;
    send_reply(client, &server_name, &IrcReply::LuserChannels { nick: nick.clone(), channels }).await;
    send_reply(client, &server_name, &IrcReply::LuserMe { nick, users: total }).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::registered_client;

    #[tokio::test]
    async fn oper_with_wrong_password_is_rejected_and_grants_no_mode() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let msg = Message::new("OPER").with_param("root").with_param("wrong");
        let result = handle_oper(&ctx, &alice.client, &msg).await;

        assert!(matches!(result, Err(HandlerError::PasswdMismatch)));
        assert!(!alice.client.modes.read().await.contains(&'o'));
    }

    #[tokio::test]
    async fn oper_with_correct_credentials_grants_operator_mode() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let msg = Message::new("OPER").with_param("root").with_param("hunter2");
        handle_oper(&ctx, &alice.client, &msg).await.unwrap();

        assert!(alice.client.modes.read().await.contains(&'o'));
    }

    #[tokio::test]
    async fn kill_by_a_non_operator_is_rejected() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;
        let _bob = registered_client(&ctx.state, "bob", 2).await;

        let msg = Message::new("KILL").with_param("bob").with_trailing("because");
        let result = handle_kill(&ctx, &alice.client, &msg).await;

        assert!(matches!(result, Err(HandlerError::NoPrivileges)));
        assert!(ctx.state.find_by_nick("bob").is_some());
    }

    #[tokio::test]
    async fn kill_by_an_operator_tears_down_the_target() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;
        let bob = registered_client(&ctx.state, "bob", 2).await;
        alice.client.modes.write().await.insert('o');

        let msg = Message::new("KILL").with_param("bob").with_trailing("spamming");
        handle_kill(&ctx, &alice.client, &msg).await.unwrap();

        assert!(ctx.state.get_client(bob.client.id).is_none());
        assert!(ctx.state.find_by_nick("bob").is_none());
    }
}
