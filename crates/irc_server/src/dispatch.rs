//! Static verb-to-handler table (C4). No reflection, no per-command parsing branch tree: one
//! match from the already-uppercased command string to a `CommandSpec` carrying the handler
//! plus the arity/registration gate the dispatcher enforces before the handler ever runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::HandlerError;
use crate::handlers::{
    HandlerContext, is_channel_name, accept, channel, messaging, misc, query, registration,
};
use crate::message::Message;
use crate::state::ClientRecord;

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
pub type HandlerFn =
    for<'a> fn(&'a HandlerContext, &'a Arc<ClientRecord>, &'a Message) -> HandlerFuture<'a>;

/// One table row: the handler plus the two gates the dispatcher checks before calling it.
/// `min_params` counts only positional params, never `trailing` — a command whose sole
/// required field is the trailing part (e.g. `NICK`'s missing-argument case) sets this to 0
/// and lets the handler emit its own, more specific numeric.
pub struct CommandSpec {
    pub min_params: usize,
    pub requires_registered: bool,
    pub handler: HandlerFn,
}

/// MODE's target decides which semantics apply: a channel name routes to channel-mode
/// handling (operator flags, key, limit), anything else is a self-only user-mode change.
async fn handle_mode(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> Result<(), HandlerError> {
    match msg.params.first() {
        Some(target) if is_channel_name(target) => channel::handle_channel_mode(ctx, client, msg).await,
        _ => registration::handle_user_mode(ctx, client, msg).await,
    }
}

macro_rules! spec {
    ($min:expr, $reg:expr, $handler:expr) => {
        CommandSpec { min_params: $min, requires_registered: $reg, handler: $handler }
    };
}

/// Looks up the dispatch row for an already-uppercased verb. Returns `None` for anything not
/// in the table, which the caller turns into ERR_UNKNOWNCOMMAND (421).
pub fn lookup(verb: &str) -> Option<CommandSpec> {
    Some(match verb {
        // Registration: never gated on registration (that would be circular), and NICK's
        // empty-argument case needs its own 431 rather than a blanket 461, so it keeps
        // min_params at 0 and checks itself.
        "PASS" => spec!(1, false, |ctx, c, m| Box::pin(registration::handle_pass(ctx, c, m))),
        "NICK" => spec!(0, false, |ctx, c, m| Box::pin(registration::handle_nick(ctx, c, m))),
        "USER" => spec!(1, false, |ctx, c, m| Box::pin(registration::handle_user(ctx, c, m))),
        "QUIT" => spec!(0, false, |ctx, c, m| Box::pin(registration::handle_quit(ctx, c, m))),
        "MODE" => spec!(1, true, |ctx, c, m| Box::pin(handle_mode(ctx, c, m))),

        "JOIN" => spec!(1, true, |ctx, c, m| Box::pin(channel::handle_join(ctx, c, m))),
        "PART" => spec!(1, true, |ctx, c, m| Box::pin(channel::handle_part(ctx, c, m))),
        "TOPIC" => spec!(1, true, |ctx, c, m| Box::pin(channel::handle_topic(ctx, c, m))),
        "INVITE" => spec!(2, true, |ctx, c, m| Box::pin(channel::handle_invite(ctx, c, m))),
        "KICK" => spec!(2, true, |ctx, c, m| Box::pin(channel::handle_kick(ctx, c, m))),
        "NAMES" => spec!(0, true, |ctx, c, m| Box::pin(channel::handle_names(ctx, c, m))),
        "LIST" => spec!(0, true, |ctx, c, m| Box::pin(channel::handle_list(ctx, c, m))),
        "WHO" => spec!(0, true, |ctx, c, m| Box::pin(channel::handle_who(ctx, c, m))),

        // PRIVMSG/NOTICE need both a target param and trailing text; that distinction (and
        // NOTICE's never-reply rule) is finer than a flat min_params count, so both keep 0
        // here and validate themselves.
        "PRIVMSG" => spec!(0, true, |ctx, c, m| Box::pin(messaging::handle_privmsg(ctx, c, m))),
        "NOTICE" => spec!(0, true, |ctx, c, m| Box::pin(messaging::handle_notice(ctx, c, m))),

        "WHOIS" => spec!(1, true, |ctx, c, m| Box::pin(query::handle_whois(ctx, c, m))),
        "WHOWAS" => spec!(1, true, |ctx, c, m| Box::pin(query::handle_whowas(ctx, c, m))),

        "PING" => spec!(0, false, |ctx, c, m| Box::pin(misc::handle_ping(ctx, c, m))),
        "PONG" => spec!(0, false, |ctx, c, m| Box::pin(misc::handle_pong(ctx, c, m))),
        "VERSION" => spec!(0, true, |ctx, c, m| Box::pin(misc::handle_version(ctx, c, m))),
        "STATS" => spec!(0, true, |ctx, c, m| Box::pin(misc::handle_stats(ctx, c, m))),
        "LINKS" => spec!(0, true, |ctx, c, m| Box::pin(misc::handle_links(ctx, c, m))),
        "CAP" => spec!(0, false, |ctx, c, m| Box::pin(misc::handle_cap(ctx, c, m))),

        "AWAY" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_away(ctx, c, m))),
        "OPER" => spec!(2, true, |ctx, c, m| Box::pin(accept::handle_oper(ctx, c, m))),
        "KILL" => spec!(1, true, |ctx, c, m| Box::pin(accept::handle_kill(ctx, c, m))),
        "REHASH" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_rehash(ctx, c, m))),
        "DIE" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_die(ctx, c, m))),
        "RESTART" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_restart(ctx, c, m))),
        "CONNECT" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_connect(ctx, c, m))),
        "SQUIT" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_squit(ctx, c, m))),
        "WALLOPS" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_wallops(ctx, c, m))),
        "USERHOST" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_userhost(ctx, c, m))),
        "ISON" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_ison(ctx, c, m))),
        "SUMMON" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_summon(ctx, c, m))),
        "USERS" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_users(ctx, c, m))),
        "SERVLIST" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_servlist(ctx, c, m))),
        "SQUERY" => spec!(1, true, |ctx, c, m| Box::pin(accept::handle_squery(ctx, c, m))),
        "SERVICE" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_service(ctx, c, m))),
        "ERROR" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_error(ctx, c, m))),
        "ADMIN" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_admin(ctx, c, m))),
        "INFO" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_info(ctx, c, m))),
        "TIME" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_time(ctx, c, m))),
        "MOTD" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_motd(ctx, c, m))),
        "LUSERS" => spec!(0, true, |ctx, c, m| Box::pin(accept::handle_lusers(ctx, c, m))),

        _ => return None,
    })
}
