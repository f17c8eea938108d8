//! PRIVMSG / NOTICE (RFC 2812 3.3).

use std::sync::Arc;

use crate::errors::HandlerError;
use crate::fanout::broadcast_to_channel_except;
use crate::handlers::{HandlerContext, HandlerResult, is_channel_name, require_registered};
use crate::message::Message;
use crate::state::ClientRecord;

async fn deliver(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
    verb: &str,
    notify_errors: bool,
) -> HandlerResult {
    require_registered(client)?;
    let Some(target) = msg.params.first() else {
        return if notify_errors {
            Err(HandlerError::NeedMoreParams(verb.to_string()))
        } else {
            Ok(())
        };
    };
    let Some(text) = &msg.trailing else {
        return if notify_errors {
            Err(HandlerError::NeedMoreParams(verb.to_string()))
        } else {
            Ok(())
        };
    };

    let nick = client.current_nick().await.unwrap_or_default();
    let user = client.user.read().await.clone().unwrap_or_default();
    let line = format!(":{nick}!{user}@{} {verb} {target} :{text}", client.addr.ip());

    if is_channel_name(target) {
        let Some(channel) = ctx.state.get_channel(target) else {
            return if notify_errors {
                Err(HandlerError::NoSuchChannel(target.clone()))
            } else {
                Ok(())
            };
        };
        if !channel.members.contains(&client.id) {
            let modes = channel.modes.read().await;
            if modes.no_external_msgs {
                drop(modes);
                return if notify_errors {
                    Err(HandlerError::NotOnChannel(target.clone()))
                } else {
                    Ok(())
                };
            }
        }
        broadcast_to_channel_except(&channel, line, client.id);
    } else {
        let Some(recipient) = ctx.state.find_by_nick(target) else {
            return if notify_errors {
                Err(HandlerError::NoSuchNick(target.clone()))
            } else {
                Ok(())
            };
        };
        recipient.send_line(line).await;
    }
    Ok(())
}

pub async fn handle_privmsg(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    deliver(ctx, client, msg, "PRIVMSG", true).await
}

/// NOTICE never generates an error reply back to the sender (RFC 2812 3.3.2) — that is the one
/// behavioral difference from PRIVMSG.
pub async fn handle_notice(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    deliver(ctx, client, msg, "NOTICE", false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::channel::handle_join;
    use crate::handlers::test_support::{registered_client, test_config};
    use crate::state::ServerState;

    fn privmsg(target: &str, text: &str) -> Message {
        Message::new("PRIVMSG").with_param(target).with_trailing(text)
    }

    fn notice(target: &str, text: &str) -> Message {
        Message::new("NOTICE").with_param(target).with_trailing(text)
    }

    /// A direct PRIVMSG to an unknown nick is a 401 to the sender.
    #[tokio::test]
    async fn privmsg_to_unknown_nick_errors() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let result = handle_privmsg(&ctx, &alice.client, &privmsg("ghost", "hi")).await;
        assert!(matches!(result, Err(HandlerError::NoSuchNick(_))));
    }

    /// NOTICE never produces an error reply back to the sender, even for the exact conditions
    /// that would be a 401/411/412 under PRIVMSG (RFC 2812 3.3.2).
    #[tokio::test]
    async fn notice_to_unknown_nick_is_silently_ignored() {
        let ctx = crate::handlers::test_support::test_context();
        let alice = registered_client(&ctx.state, "alice", 1).await;

        let result = handle_notice(&ctx, &alice.client, &notice("ghost", "hi")).await;
        assert!(result.is_ok());
    }

    /// A direct PRIVMSG is delivered straight into the recipient's own mailbox, bypassing the
    /// channel broadcast bus entirely.
    #[tokio::test]
    async fn direct_privmsg_is_delivered_to_recipient_only() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let ctx = HandlerContext { state: state.clone(), config: test_config() };
        let alice = registered_client(&state, "alice", 1).await;
        let mut bob = registered_client(&state, "bob", 2).await;

        handle_privmsg(&ctx, &alice.client, &privmsg("bob", "hello there")).await.unwrap();

        let lines = bob.drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("PRIVMSG bob :hello there"), "{lines:?}");
    }

    /// Scenario 4 (§8): alice and bob share #x; alice's channel PRIVMSG reaches bob exactly
    /// once and is never echoed back to alice herself.
    #[tokio::test]
    async fn channel_privmsg_excludes_sender_and_reaches_members_once() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let ctx = HandlerContext { state: state.clone(), config: test_config() };
        let alice = registered_client(&state, "alice", 1).await;
        let bob = registered_client(&state, "bob", 2).await;

        handle_join(&ctx, &alice.client, &Message::new("JOIN").with_param("#x")).await.unwrap();
        handle_join(&ctx, &bob.client, &Message::new("JOIN").with_param("#x")).await.unwrap();

        let channel = ctx.state.get_channel("#x").unwrap();
        let mut alice_events = channel.subscribe();
        let mut bob_events = channel.subscribe();

        handle_privmsg(&ctx, &alice.client, &privmsg("#x", "hello all")).await.unwrap();

        let bob_event = bob_events.try_recv().expect("bob should receive the channel message");
        assert!(bob_event.line.contains("PRIVMSG #x :hello all"));

        // alice's own subscription receives the broadcast send (it has no per-client exclude
        // filter at this layer — that filtering happens in the forwarder task), but it is
        // tagged to exclude her, which is what the production forwarder checks before ever
        // writing it to her mailbox.
        let alice_event = alice_events.try_recv().expect("the bus carries one event total");
        assert_eq!(alice_event.exclude, Some(alice.client.id));
    }

    /// A freshly-created channel defaults to `+n`, so a non-member cannot PRIVMSG into it.
    #[tokio::test]
    async fn privmsg_from_a_non_member_into_a_fresh_channel_is_rejected() {
        let state = Arc::new(ServerState::new("mock.server".into()));
        let ctx = HandlerContext { state: state.clone(), config: test_config() };
        let alice = registered_client(&state, "alice", 1).await;
        let bob = registered_client(&state, "bob", 2).await;

        handle_join(&ctx, &alice.client, &Message::new("JOIN").with_param("#x")).await.unwrap();

        let result = handle_privmsg(&ctx, &bob.client, &privmsg("#x", "hi")).await;
        assert!(matches!(result, Err(HandlerError::NotOnChannel(_))));
    }
}
