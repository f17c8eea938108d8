//! The connection endpoint (C2). Owns one accepted socket end to end: registration-timeout
//! enforcement, CRLF line framing, dispatch into the command table, and the write-ordering
//! guarantee that every line destined for this client — a direct reply or a channel broadcast —
//! passes through the same outbound mailbox, so nothing can race ahead of it on the wire.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::dispatch;
use crate::handlers::registration::teardown_client;
use crate::handlers::HandlerContext;
use crate::message::{parse_message, Message};
use crate::replies::IrcReply;
use crate::state::store::new_connection_channels;
use crate::state::{ChannelEvent, ClientRecord, ServerState, SubscriptionControl};

/// Drives one accepted connection until EOF, a protocol-level close, or a server-initiated
/// shutdown (KILL, idle eviction), then tears the client down exactly once.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    state: Arc<ServerState>,
    config: Arc<Config>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let id = state.next_client_id();
    let (tx_outbound, rx_outbound, tx_control, rx_control) = new_connection_channels();
    let client = ClientRecord::new(id, addr, tx_outbound, tx_control, now_unix());
    state.insert_client(client.clone());
    info!("[{id}] connected from {addr}");

    let ctx = HandlerContext { state: state.clone(), config: config.clone() };

    let writer_task = spawn_writer(write_half, rx_outbound);
    let subscription_task =
        spawn_subscription_manager(rx_control, client.tx_outbound.clone(), client.clone(), ctx.clone());
    let registration_deadline = Duration::from_secs(config.limits.unregistered_timeout);

    let completed_registration = run_until_registered(&mut reader, &client, &ctx, registration_deadline).await;
    if completed_registration {
        run_registered(&mut reader, &client, &ctx).await;
    }

    teardown_client(&ctx, &client, "Connection closed").await;
    writer_task.abort();
    subscription_task.abort();
    debug!("[{id}] connection task finished");
}

/// Reads lines until PASS/NICK/USER land, the socket closes, the registration window elapses,
/// or a server-initiated shutdown fires. Returns whether registration actually completed.
async fn run_until_registered<R>(
    reader: &mut BufReader<R>,
    client: &Arc<ClientRecord>,
    ctx: &HandlerContext,
    deadline: Duration,
) -> bool
where
    R: AsyncRead + Unpin,
{
    let outcome = tokio::time::timeout(deadline, async {
        let mut line = String::new();
        loop {
            line.clear();
            tokio::select! {
                biased;
                _ = client.shutdown.notified() => return false,
                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => return false,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("[{}] read error: {e}", client.id);
                            return false;
                        }
                    }
                }
            }
            process_line(ctx, client, &line).await;
            if client.is_registered() {
                return true;
            }
        }
    })
    .await;

    match outcome {
        Ok(true) => true,
        Ok(false) => false,
        Err(_) => {
            client
                .send_line(format!(":{} ERROR :Closing Link: registration timed out", ctx.config.server.name))
                .await;
            false
        }
    }
}

/// The steady-state loop for an already-registered client: no deadline, runs until EOF or a
/// server-initiated shutdown.
async fn run_registered<R>(reader: &mut BufReader<R>, client: &Arc<ClientRecord>, ctx: &HandlerContext)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        tokio::select! {
            biased;
            _ = client.shutdown.notified() => return,
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => return,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("[{}] read error: {e}", client.id);
                        return;
                    }
                }
            }
        }
        process_line(ctx, client, &line).await;
    }
}

/// Parses and dispatches one line. A line a single TCP read may have yielded zero, one, or many
/// of — the caller's `read_line` already handles the framing, so this only ever sees one.
/// Codec failures (malformed grammar, an over-length line) discard the offending line; they
/// never tear down the connection.
async fn process_line(ctx: &HandlerContext, client: &Arc<ClientRecord>, raw: &str) {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return;
    }
    client.touch(now_unix());

    let message = match parse_message(trimmed) {
        Ok(m) => m,
        Err(e) => {
            debug!("[{}] discarding malformed line: {e}", client.id);
            return;
        }
    };

    dispatch_message(ctx, client, &message).await;
}

/// Looks the verb up in the dispatch table, then enforces the two gates the table carries
/// (registration state, minimum param count) before ever calling into a handler. Individual
/// handlers may still re-check either condition for a more specific numeric; this is the
/// blanket 451/461 backstop the command table promises.
async fn dispatch_message(ctx: &HandlerContext, client: &Arc<ClientRecord>, message: &Message) {
    let nick = || client.current_nick();

    let Some(spec) = dispatch::lookup(&message.command) else {
        let nick = nick().await.unwrap_or_else(|| "*".into());
        client
            .send_line(
                IrcReply::ErrUnknownCommand { nick, command: message.command.clone() }
                    .format(&ctx.config.server.name),
            )
            .await;
        return;
    };

    if spec.requires_registered && !client.is_registered() {
        let nick = nick().await.unwrap_or_else(|| "*".into());
        client
            .send_line(IrcReply::ErrNotRegistered { nick }.format(&ctx.config.server.name))
            .await;
        return;
    }

    if message.params.len() < spec.min_params {
        let nick = nick().await.unwrap_or_else(|| "*".into());
        client
            .send_line(
                IrcReply::ErrNeedMoreParams { nick, command: message.command.clone() }
                    .format(&ctx.config.server.name),
            )
            .await;
        return;
    }

    if let Err(err) = (spec.handler)(ctx, client, message).await {
        let nick = nick().await.unwrap_or_else(|| "*".into());
        let reply = IrcReply::from_handler_error(&err, &nick);
        client.send_line(reply.format(&ctx.config.server.name)).await;
    }
}

/// Drains the per-client outbound mailbox onto the socket, CRLF-terminating every line. The
/// mailbox is the single choke point through which direct replies and channel fan-out both
/// flow, which is what gives a client's own writes a stable order.
fn spawn_writer<W>(mut write_half: W, mut rx_outbound: mpsc::Receiver<String>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(line) = rx_outbound.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\r\n").await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    })
}

/// Maintains one forwarder task per channel this client currently belongs to, started on
/// `Subscribe` and cancelled on `Unsubscribe`, each copying `ChannelEvent` lines into the same
/// outbound mailbox the direct replies use.
fn spawn_subscription_manager(
    mut rx_control: mpsc::Receiver<SubscriptionControl>,
    tx_outbound: mpsc::Sender<String>,
    client: Arc<ClientRecord>,
    ctx: HandlerContext,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();
        while let Some(ctrl) = rx_control.recv().await {
            match ctrl {
                SubscriptionControl::Subscribe { channel, receiver } => {
                    let handle = tokio::spawn(forward_channel_events(
                        receiver,
                        tx_outbound.clone(),
                        client.clone(),
                        ctx.clone(),
                    ));
                    if let Some(old) = forwarders.insert(channel, handle) {
                        old.abort();
                    }
                }
                SubscriptionControl::Unsubscribe(channel) => {
                    if let Some(handle) = forwarders.remove(&channel) {
                        handle.abort();
                    }
                }
            }
        }
        for (_, handle) in forwarders {
            handle.abort();
        }
    })
}

/// Copies one channel's broadcast bus into `tx_outbound`, skipping events that exclude this
/// client (a PRIVMSG/NOTICE echo back to its own sender). A receiver that lags past the
/// broadcast channel's buffer has missed messages it can never recover, so rather than resume
/// mid-gap this tears the connection down, the same as an idle-timeout eviction.
async fn forward_channel_events(
    mut receiver: broadcast::Receiver<ChannelEvent>,
    tx_outbound: mpsc::Sender<String>,
    client: Arc<ClientRecord>,
    ctx: HandlerContext,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if event.exclude == Some(client.id) {
                    continue;
                }
                if tx_outbound.send(event.line).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("[{}] lagged {n} channel events behind, closing connection", client.id);
                teardown_client(&ctx, &client, "Excess Flood").await;
                return;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
