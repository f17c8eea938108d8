//! Channel state: membership, operator/voice sets, topic, modes and the broadcast bus members
//! subscribe to for fan-out.

use dashmap::DashSet;
use tokio::sync::{Mutex, RwLock, broadcast};

use crate::state::client::ClientId;

const CHANNEL_BROADCAST_CAPACITY: usize = 1024;

/// One fanned-out line plus who it must not be delivered to. JOIN/PART/TOPIC/MODE/KICK/QUIT
/// broadcasts carry `exclude: None` (the actor sees its own echo, e.g. a joiner sees its own
/// JOIN); PRIVMSG/NOTICE channel broadcasts carry `exclude: Some(sender)` so the speaker is not
/// echoed its own message.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub line: String,
    pub exclude: Option<ClientId>,
}

impl ChannelEvent {
    pub fn to_all(line: String) -> Self {
        ChannelEvent { line, exclude: None }
    }

    pub fn excluding(line: String, sender: ClientId) -> Self {
        ChannelEvent { line, exclude: Some(sender) }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelModes {
    pub invite_only: bool,         // +i
    pub no_external_msgs: bool,    // +n
    pub topic_lock: bool,          // +t
    pub key: Option<String>,       // +k <key>
    pub user_limit: Option<usize>, // +l <count>
}

impl Default for ChannelModes {
    /// A freshly-created channel starts `+nt`: no external messages, topic locked to operators.
    fn default() -> Self {
        ChannelModes {
            invite_only: false,
            no_external_msgs: true,
            topic_lock: true,
            key: None,
            user_limit: None,
        }
    }
}

impl ChannelModes {
    /// Renders the `+xyz [params]` form used by MODE query replies and change echoes.
    pub fn render(&self) -> String {
        let mut flags = String::from("+");
        let mut params = Vec::new();
        if self.invite_only {
            flags.push('i');
        }
        if self.no_external_msgs {
            flags.push('n');
        }
        if self.topic_lock {
            flags.push('t');
        }
        if let Some(key) = &self.key {
            flags.push('k');
            params.push(key.clone());
        }
        if let Some(limit) = self.user_limit {
            flags.push('l');
            params.push(limit.to_string());
        }
        if params.is_empty() {
            flags
        } else {
            format!("{flags} {}", params.join(" "))
        }
    }
}

#[derive(Debug)]
pub struct TopicState {
    pub text: Option<String>,
    pub set_by: Option<String>,
    pub set_at: Option<u64>,
}

impl Default for TopicState {
    fn default() -> Self {
        TopicState { text: None, set_by: None, set_at: None }
    }
}

#[derive(Debug)]
pub struct ChannelRecord {
    pub name: String,
    pub topic: RwLock<TopicState>,
    pub members: DashSet<ClientId>,
    pub operators: DashSet<ClientId>,
    pub voiced: DashSet<ClientId>,
    pub invited: DashSet<ClientId>,
    pub modes: RwLock<ChannelModes>,
    /// Join order of current members, oldest first. Consulted only when the operator set goes
    /// empty, to promote the earliest remaining joiner (the resolved policy for an operatorless
    /// channel — RFC 2812 leaves this to implementations).
    join_order: Mutex<Vec<ClientId>>,
    tx: broadcast::Sender<ChannelEvent>,
}

impl ChannelRecord {
    /// The channel's creator is seated as its first operator (RFC 2812 3.2.1).
    pub fn new(name: String, creator: ClientId) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_BROADCAST_CAPACITY);
        let members = DashSet::new();
        members.insert(creator);
        let operators = DashSet::new();
        operators.insert(creator);
        ChannelRecord {
            name,
            topic: RwLock::new(TopicState::default()),
            members,
            operators,
            voiced: DashSet::new(),
            invited: DashSet::new(),
            modes: RwLock::new(ChannelModes::default()),
            join_order: Mutex::new(vec![creator]),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }

    pub fn broadcast(&self, event: ChannelEvent) {
        // No receivers is the common case right after the last member parts; a dropped send is
        // not a failure.
        let _ = self.tx.send(event);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_operator(&self, client: ClientId) -> bool {
        self.operators.contains(&client)
    }

    pub async fn add_member(&self, client: ClientId) {
        self.members.insert(client);
        self.join_order.lock().await.push(client);
    }

    /// Removes a member and, if that member was the last operator, promotes the earliest
    /// remaining joiner so the channel is never left leaderless while members remain.
    pub async fn remove_member(&self, client: ClientId) -> Option<ClientId> {
        self.members.remove(&client);
        self.operators.remove(&client);
        self.voiced.remove(&client);
        let mut order = self.join_order.lock().await;
        order.retain(|c| *c != client);
        if self.operators.is_empty() {
            if let Some(&next) = order.first() {
                self.operators.insert(next);
                return Some(next);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creator_is_seated_as_first_operator() {
        let ch = ChannelRecord::new("#x".into(), 1);
        assert!(ch.members.contains(&1));
        assert!(ch.is_operator(1));
    }

    #[tokio::test]
    async fn last_operator_leaving_promotes_earliest_remaining_joiner() {
        let ch = ChannelRecord::new("#x".into(), 1);
        ch.add_member(2).await;
        ch.add_member(3).await;

        let promoted = ch.remove_member(1).await;
        assert_eq!(promoted, Some(2));
        assert!(ch.is_operator(2));
        assert!(!ch.is_operator(3));
    }

    #[tokio::test]
    async fn removing_a_non_operator_member_does_not_disturb_operators() {
        let ch = ChannelRecord::new("#x".into(), 1);
        ch.add_member(2).await;

        let promoted = ch.remove_member(2).await;
        assert_eq!(promoted, None);
        assert!(ch.is_operator(1));
    }

    #[tokio::test]
    async fn is_empty_reflects_member_set() {
        let ch = ChannelRecord::new("#x".into(), 1);
        assert!(!ch.is_empty());
        ch.remove_member(1).await;
        assert!(ch.is_empty());
    }
}
