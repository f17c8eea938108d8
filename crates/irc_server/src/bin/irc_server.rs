use std::sync::Arc;

use clap::Parser;
use flexi_logger::{Duplicate, Logger};
use log::{error, info, warn};
use tokio::net::TcpListener;

use irc_server::config::Config;
use irc_server::connection::handle_connection;
use irc_server::liveness;
use irc_server::state::ServerState;
use irc_server::tls::build_acceptor;

#[derive(Parser, Debug)]
#[command(name = "irc_server", about = "Server-side IRC protocol engine")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")
        .and_then(|logger| logger.log_to_stderr().duplicate_to_stderr(Duplicate::All).start())
        .ok();

    let args = Args::parse();
    let config = Arc::new(Config::load(&args.config)?);
    let state = Arc::new(ServerState::new(config.server.name.clone()));

    let bind_addr = format!("{}:{}", config.network.bind_address, config.network.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("listening on {bind_addr}");

    let acceptor = match (&config.network.tls_cert_path, &config.network.tls_key_path) {
        (Some(cert), Some(key)) => {
            info!("TLS enabled (cert: {cert})");
            Some(build_acceptor(cert, key).await?)
        }
        _ => {
            warn!("no TLS certificate configured; serving plaintext");
            None
        }
    };

    // The liveness supervisor runs for the server's lifetime alongside the accept loop; neither
    // handle is ever joined under normal operation.
    let (_ping_task, _sweep_task) = liveness::spawn(state.clone(), config.clone());

    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("accept failed: {e}");
                continue;
            }
        };

        if state.client_count() >= config.network.max_connections {
            warn!("rejecting {addr}: server at max_connections ({})", config.network.max_connections);
            continue;
        }
        let per_ip = state
            .all_client_ids()
            .into_iter()
            .filter_map(|id| state.get_client(id))
            .filter(|c| c.addr.ip() == addr.ip())
            .count();
        if per_ip >= config.limits.max_connections_per_ip {
            warn!("rejecting {addr}: max_connections_per_ip ({}) reached", config.limits.max_connections_per_ip);
            continue;
        }

        let state = state.clone();
        let config = config.clone();
        match &acceptor {
            Some(acceptor) => {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor.accept(socket).await {
                        Ok(tls_stream) => handle_connection(tls_stream, addr, state, config).await,
                        Err(e) => error!("TLS handshake with {addr} failed: {e}"),
                    }
                });
            }
            None => {
                tokio::spawn(handle_connection(socket, addr, state, config));
            }
        }
    }
}
