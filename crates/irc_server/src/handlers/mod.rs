pub mod accept;
pub mod channel;
pub mod messaging;
pub mod misc;
pub mod query;
pub mod registration;

use std::sync::Arc;

use crate::config::Config;
use crate::errors::HandlerError;
use crate::state::{ClientRecord, ServerState};

/// Everything a handler needs besides the incoming message and its own connection.
#[derive(Clone)]
pub struct HandlerContext {
    pub state: Arc<ServerState>,
    pub config: Arc<Config>,
}

pub type HandlerResult = Result<(), HandlerError>;

/// Fails registration-gated commands with the standard reply when called before NICK/USER.
pub fn require_registered(client: &ClientRecord) -> Result<(), HandlerError> {
    if client.is_registered() {
        Ok(())
    } else {
        Err(HandlerError::NotRegistered)
    }
}

pub fn require_param<'a>(
    params: &'a [String],
    idx: usize,
    command: &str,
) -> Result<&'a str, HandlerError> {
    params
        .get(idx)
        .map(String::as_str)
        .ok_or_else(|| HandlerError::NeedMoreParams(command.to_string()))
}

pub fn is_channel_name(s: &str) -> bool {
    s.starts_with('#') || s.starts_with('&') || s.starts_with('+') || s.starts_with('!')
}

/// Shared scaffolding for handler tests: builds a `HandlerContext` and bare `ClientRecord`s
/// wired to real `mpsc` mailboxes but no socket, so a test can drive a handler directly and
/// assert on the exact lines it would have written to the wire.
#[cfg(test)]
pub(crate) mod test_support {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::config::{Config, LimitsConfig, LivenessConfig, NetworkConfig, OperatorCredential, ServerConfig};
    use crate::handlers::HandlerContext;
    use crate::state::client::ClientRecord;
    use crate::state::store::new_connection_channels;
    use crate::state::ServerState;

    pub fn test_config() -> Arc<Config> {
        Arc::new(Config {
            server: ServerConfig {
                name: "mock.server".into(),
                version: "1.0".into(),
                motd: "Welcome to the mock server".into(),
            },
            network: NetworkConfig {
                bind_address: "127.0.0.1".into(),
                port: 6667,
                max_connections: 100,
                tls_cert_path: None,
                tls_key_path: None,
            },
            limits: LimitsConfig {
                max_channels_per_user: 10,
                max_message_length: 512,
                max_connections_per_ip: 5,
                unregistered_timeout: 60,
            },
            liveness: LivenessConfig::default(),
            operators: vec![OperatorCredential { name: "root".into(), password: "hunter2".into() }],
        })
    }

    pub fn test_context() -> HandlerContext {
        HandlerContext { state: Arc::new(ServerState::new("mock.server".into())), config: test_config() }
    }

    /// One bare connection's worth of state: the `ClientRecord` the handlers mutate, plus the
    /// receiving end of its outbound mailbox so the test can assert on what was written to it.
    pub struct TestClient {
        pub client: Arc<ClientRecord>,
        pub outbound: mpsc::Receiver<String>,
    }

    impl TestClient {
        /// Drains every line currently queued in the mailbox without blocking.
        pub fn drain(&mut self) -> Vec<String> {
            let mut lines = Vec::new();
            while let Ok(line) = self.outbound.try_recv() {
                lines.push(line);
            }
            lines
        }
    }

    /// Registers a fresh, already-`REGISTERED` client in `state` under `nick`, as if PASS/NICK/
    /// USER had already completed — the common starting point for a handler test that doesn't
    /// care about the registration handshake itself.
    pub async fn registered_client(state: &ServerState, nick: &str, port: u16) -> TestClient {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port);
        let id = state.next_client_id();
        let (tx_outbound, rx_outbound, tx_control, _rx_control) = new_connection_channels();
        let client = ClientRecord::new(id, addr, tx_outbound, tx_control, 0);
        state.insert_client(client.clone());
        assert!(state.try_claim_nick(id, nick, None));
        *client.nick.write().await = Some(nick.to_string());
        *client.user.write().await = Some(nick.to_lowercase());
        *client.realname.write().await = Some(format!("{nick} real name"));
        client.mark_registered_if_ready().await;
        TestClient { client, outbound: rx_outbound }
    }
}
