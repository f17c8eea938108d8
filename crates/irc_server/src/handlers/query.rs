//! WHOIS / WHOWAS (RFC 2812 3.6.2, 3.6.3).

use std::sync::Arc;

use crate::errors::HandlerError;
use crate::fanout::send_reply;
use crate::handlers::{HandlerContext, HandlerResult, require_param, require_registered};
use crate::message::Message;
use crate::replies::IrcReply;
use crate::state::ClientRecord;

pub async fn handle_whois(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let target_nick = require_param(&msg.params, 0, "WHOIS")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    let target = ctx
        .state
        .find_by_nick(target_nick)
        .ok_or_else(|| HandlerError::NoSuchNick(target_nick.to_string()))?;

    let target_user = target.user.read().await.clone().unwrap_or_default();
    let target_realname = target.realname.read().await.clone().unwrap_or_default();
    let target_actual_nick = target.current_nick().await.unwrap_or_default();

    send_reply(
        client,
        &server_name,
        &IrcReply::WhoisUser {
            nick: nick.clone(),
            target: target_actual_nick.clone(),
            user: target_user,
            host: target.addr.ip().to_string(),
            realname: target_realname,
        },
    )
    .await;
    if let Some(message) = target.away_message.read().await.clone() {
        send_reply(
            client,
            &server_name,
            &IrcReply::Away {
                nick: nick.clone(),
                target: target_actual_nick.clone(),
                message,
            },
        )
        .await;
    }
    send_reply(
        client,
        &server_name,
        &IrcReply::WhoisServer {
            nick: nick.clone(),
            target: target_actual_nick.clone(),
            server: server_name.clone(),
            info: ctx.config.server.motd.clone(),
        },
    )
    .await;
    send_reply(
        client,
        &server_name,
        &IrcReply::WhoisIdle {
            nick: nick.clone(),
            target: target_actual_nick.clone(),
            idle_secs: target.idle_for(now_unix()),
        },
    )
    .await;
    send_reply(
        client,
        &server_name,
        &IrcReply::EndOfWhois { nick, target: target_actual_nick },
    )
    .await;
    Ok(())
}

pub async fn handle_whowas(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let target_nick = require_param(&msg.params, 0, "WHOWAS")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    let history = ctx.state.whowas_history(target_nick);
    if history.is_empty() {
        return Err(HandlerError::NoSuchWhowas(target_nick.to_string()));
    }

    for entry in &history {
        send_reply(
            client,
            &server_name,
            &IrcReply::WhowasUser {
                nick: nick.clone(),
                target: entry.nick.clone(),
                user: entry.user.clone(),
                host: entry.host.clone(),
                realname: entry.realname.clone(),
            },
        )
        .await;
    }
    send_reply(
        client,
        &server_name,
        &IrcReply::EndOfWhowas { nick, target: target_nick.to_string() },
    )
    .await;
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
    use crate::handlers::registration::teardown_client;
    use crate::handlers::test_support::registered_client;

    fn whois(target: &str) -> Message {
        Message::new("WHOIS").with_param(target)
    }

    fn whowas(target: &str) -> Message {
        Message::new("WHOWAS").with_param(target)
    }

    #[tokio::test]
    async fn whois_of_unknown_nick_errors() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let result = handle_whois(&ctx, &alice.client, &whois("ghost")).await;
        assert!(matches!(result, Err(HandlerError::NoSuchNick(_))));
    }

    #[tokio::test]
    async fn whois_reports_the_target_and_ends_with_318() {
        let ctx = crate::handlers::test_support::test_context();
        let mut alice = registered_client(&ctx.state, "alice", 1).await;
        let _bob = registered_client(&ctx.state, "bob", 2).await;

        handle_whois(&ctx, &alice.client, &whois("bob")).await.unwrap();

        let lines = alice.drain();
        assert!(lines.iter().any(|l| l.contains("311") && l.contains("bob")), "{lines:?}");
        assert!(lines.last().unwrap().contains("318"), "{lines:?}");
    }

    #[tokio::test]
    async fn whowas_of_a_nick_with_no_history_errors() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let result = handle_whowas(&ctx, &alice.client, &whowas("ghost")).await;
        assert!(matches!(result, Err(HandlerError::NoSuchWhowas(_))));
    }

    /// After a tracked client disconnects, WHOWAS surfaces the recorded history newest-first,
    /// ending with 369.
    #[tokio::test]
    async fn whowas_surfaces_history_after_disconnect() {
        let ctx = crate::handlers::test_support::test_context();
        let mut alice = registered_client(&ctx.state, "alice", 1).await;
        let bob = registered_client(&ctx.state, "bob", 2).await;

        teardown_client(&ctx, &bob.client, "bye").await;

        handle_whowas(&ctx, &alice.client, &whowas("bob")).await.unwrap();

        let lines = alice.drain();
        assert!(lines.iter().any(|l| l.contains("314") && l.contains("bob")), "{lines:?}");
        assert!(lines.last().unwrap().contains("369"), "{lines:?}");
    }
}
