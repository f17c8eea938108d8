//! Delivery helpers shared by every handler: targeted replies to one client, and channel
//! broadcasts with the actor either included (state-change echoes) or excluded (messaging).

use std::collections::HashSet;
use std::sync::Arc;

use crate::replies::IrcReply;
use crate::state::{ChannelEvent, ChannelRecord, ClientId, ClientRecord, ServerState};

/// Sends one numeric reply to `client`, using `server_name` as the reply prefix.
pub async fn send_reply(client: &ClientRecord, server_name: &str, reply: &IrcReply) {
    client.send_line(reply.format(server_name)).await;
}

/// Sends an already-formatted raw line (e.g. a command echo such as `:nick!user@host JOIN #x`)
/// to a single client.
pub async fn send_line(client: &ClientRecord, line: String) {
    client.send_line(line).await;
}

/// Broadcasts `line` to every member of `channel`, the actor included. Used for JOIN/PART/
/// TOPIC/MODE/KICK/QUIT notices, where the actor must see their own action reflected.
pub fn broadcast_to_channel(channel: &ChannelRecord, line: String) {
    channel.broadcast(ChannelEvent::to_all(line));
}

/// Broadcasts `line` to every member of `channel` except `sender`. Used for PRIVMSG/NOTICE,
/// where the speaker must not be echoed their own message.
pub fn broadcast_to_channel_except(channel: &ChannelRecord, line: String, sender: ClientId) {
    channel.broadcast(ChannelEvent::excluding(line, sender));
}

/// Delivers `line` exactly once to every distinct client who shares at least one channel with
/// `client_id`, regardless of how many channels they share — two members of both #a and #b
/// must observe a single QUIT or NICK line, not one per shared channel. Bypasses the per-channel
/// broadcast bus entirely (which has no cross-channel view of a recipient) and writes straight
/// into each recipient's own outbound mailbox instead, landing in the same write-ordered queue a
/// channel-forwarded event would have used.
pub async fn deliver_once_to_shared_channel_members(
    state: &Arc<ServerState>,
    client_id: ClientId,
    line: &str,
    exclude_self: bool,
) {
    let mut recipients = HashSet::new();
    for channel in state.all_channels() {
        if channel.members.contains(&client_id) {
            for member in channel.members.iter().map(|m| *m) {
                recipients.insert(member);
            }
        }
    }
    if exclude_self {
        recipients.remove(&client_id);
    }
    for id in recipients {
        if let Some(client) = state.get_client(id) {
            client.send_line(line.to_string()).await;
        }
    }
}
