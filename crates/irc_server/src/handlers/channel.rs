//! JOIN / PART / TOPIC / MODE / INVITE / KICK / NAMES / LIST / WHO (RFC 2812 3.2 and 3.6).

use std::sync::Arc;

use crate::errors::HandlerError;
use crate::fanout::{broadcast_to_channel, send_reply};
use crate::handlers::{HandlerContext, HandlerResult, require_param, require_registered};
use crate::message::Message;
use crate::parsers::channel_parser;
use crate::replies::IrcReply;
use crate::state::{ClientRecord, SubscriptionControl};

fn well_formed_channel(name: &str) -> bool {
    channel_parser(name).map(|(rest, _)| rest.is_empty()).unwrap_or(false)
}

pub async fn handle_join(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let targets = require_param(&msg.params, 0, "JOIN")?;
    let keys: Vec<&str> = msg.params.get(1).map(|k| k.split(',').collect()).unwrap_or_default();
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    for (idx, channel_name) in targets.split(',').enumerate() {
        if !well_formed_channel(channel_name) {
            send_reply(
                client,
                &server_name,
                &IrcReply::ErrNoSuchChannel { nick: nick.clone(), channel: channel_name.to_string() },
            )
            .await;
            continue;
        }
        if !client.channels.contains(channel_name)
            && client.channels.len() >= ctx.config.limits.max_channels_per_user
        {
            send_reply(
                client,
                &server_name,
                &IrcReply::ErrTooManyChannels { nick: nick.clone(), channel: channel_name.to_string() },
            )
            .await;
            continue;
        }
        let channel = ctx.state.get_channel(channel_name);
        let key_attempt = keys.get(idx).copied();

        let channel = match channel {
            Some(existing) => {
                let modes = existing.modes.read().await;
                if let Some(required_key) = &modes.key {
                    if key_attempt != Some(required_key.as_str()) {
                        drop(modes);
                        continue;
                    }
                }
                if let Some(limit) = modes.user_limit {
                    if existing.members.len() >= limit {
                        drop(modes);
                        continue;
                    }
                }
                if modes.invite_only && !existing.invited.contains(&client.id) {
                    drop(modes);
                    continue;
                }
                drop(modes);
                existing
            }
            None => ctx.state.get_or_create_channel(channel_name, client.id),
        };

        if !channel.members.contains(&client.id) {
            channel.add_member(client.id).await;
            let _ = client
                .tx_control
                .send(SubscriptionControl::Subscribe {
                    channel: channel_name.to_string(),
                    receiver: channel.subscribe(),
                })
                .await;
        }
        channel.invited.remove(&client.id);
        client.channels.insert(channel_name.to_string());

        let user = client.user.read().await.clone().unwrap_or_default();
        let join_line = format!(":{nick}!{user}@{} JOIN {channel_name}", client.addr.ip());
        broadcast_to_channel(&channel, join_line);

        let topic = channel.topic.read().await;
        match &topic.text {
            Some(text) => {
                send_reply(
                    client,
                    &server_name,
                    &IrcReply::Topic { nick: nick.clone(), channel: channel_name.to_string(), topic: text.clone() },
                )
                .await
            }
            None => {
                send_reply(
                    client,
                    &server_name,
                    &IrcReply::NoTopic { nick: nick.clone(), channel: channel_name.to_string() },
                )
                .await
            }
        }
        drop(topic);

        send_names_reply(ctx, client, &nick, channel_name).await;
    }
    Ok(())
}

pub async fn handle_part(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let targets = require_param(&msg.params, 0, "PART")?;
    let reason = msg.trailing.clone().unwrap_or_else(|| "Leaving".to_string());
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    for channel_name in targets.split(',') {
        let Some(channel) = ctx.state.get_channel(channel_name) else {
            send_reply(
                client,
                &server_name,
                &IrcReply::ErrNoSuchChannel { nick: nick.clone(), channel: channel_name.to_string() },
            )
            .await;
            continue;
        };
        if !channel.members.contains(&client.id) {
            send_reply(
                client,
                &server_name,
                &IrcReply::ErrNotOnChannel { nick: nick.clone(), channel: channel_name.to_string() },
            )
            .await;
            continue;
        }
        let user = client.user.read().await.clone().unwrap_or_default();
        let part_line = format!(":{nick}!{user}@{} PART {channel_name} :{reason}", client.addr.ip());
        broadcast_to_channel(&channel, part_line);
        channel.remove_member(client.id).await;
        client.channels.remove(channel_name);
        let _ = client
            .tx_control
            .send(SubscriptionControl::Unsubscribe(channel_name.to_string()))
            .await;
        ctx.state.remove_channel_if_empty(channel_name);
    }
    Ok(())
}

pub async fn handle_topic(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let channel_name = require_param(&msg.params, 0, "TOPIC")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    let channel = ctx
        .state
        .get_channel(channel_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(channel_name.to_string()))?;
    if !channel.members.contains(&client.id) {
        return Err(HandlerError::NotOnChannel(channel_name.to_string()));
    }

    match &msg.trailing {
        None if msg.params.len() < 2 => {
            let topic = channel.topic.read().await;
            match &topic.text {
                Some(text) => {
                    send_reply(
                        client,
                        &server_name,
                        &IrcReply::Topic { nick, channel: channel_name.to_string(), topic: text.clone() },
                    )
                    .await
                }
                None => {
                    send_reply(
                        client,
                        &server_name,
                        &IrcReply::NoTopic { nick, channel: channel_name.to_string() },
                    )
                    .await
                }
            }
        }
        new_topic => {
            let text = new_topic.clone().unwrap_or_default();
            {
                let modes = channel.modes.read().await;
                if modes.topic_lock && !channel.is_operator(client.id) {
                    return Err(HandlerError::ChanOPrivsNeeded(channel_name.to_string()));
                }
            }
            let mut topic = channel.topic.write().await;
            if text.is_empty() {
                topic.text = None;
                topic.set_by = None;
                topic.set_at = None;
            } else {
                topic.text = Some(text.clone());
                topic.set_by = Some(nick.clone());
                topic.set_at = Some(now_unix());
            }
            drop(topic);

            let user = client.user.read().await.clone().unwrap_or_default();
            let line = format!(":{nick}!{user}@{} TOPIC {channel_name} :{text}", client.addr.ip());
            broadcast_to_channel(&channel, line);
        }
    }
    Ok(())
}

pub async fn handle_invite(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let target_nick = require_param(&msg.params, 0, "INVITE")?;
    let channel_name = require_param(&msg.params, 1, "INVITE")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    let channel = ctx
        .state
        .get_channel(channel_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(channel_name.to_string()))?;
    if !channel.members.contains(&client.id) {
        return Err(HandlerError::NotOnChannel(channel_name.to_string()));
    }
    let target = ctx
        .state
        .find_by_nick(target_nick)
        .ok_or_else(|| HandlerError::NoSuchNick(target_nick.to_string()))?;

    channel.invited.insert(target.id);
    let user = client.user.read().await.clone().unwrap_or_default();
    let invite_line = format!(
        ":{nick}!{user}@{} INVITE {target_nick} {channel_name}",
        client.addr.ip()
    );
    target.send_line(invite_line).await;
    send_reply(
        client,
        &server_name,
        &IrcReply::Inviting { nick, target: target_nick.to_string(), channel: channel_name.to_string() },
    )
    .await;
    Ok(())
}

pub async fn handle_kick(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let channel_name = require_param(&msg.params, 0, "KICK")?;
    let target_nick = require_param(&msg.params, 1, "KICK")?;
    let reason = msg.trailing.clone().unwrap_or_else(|| target_nick.to_string());
    let nick = client.current_nick().await.unwrap_or_default();

    let channel = ctx
        .state
        .get_channel(channel_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(channel_name.to_string()))?;
    if !channel.members.contains(&client.id) {
        return Err(HandlerError::NotOnChannel(channel_name.to_string()));
    }
    if !channel.is_operator(client.id) {
        return Err(HandlerError::ChanOPrivsNeeded(channel_name.to_string()));
    }
    let target = ctx
        .state
        .find_by_nick(target_nick)
        .filter(|t| channel.members.contains(&t.id))
        .ok_or_else(|| HandlerError::UserNotInChannel(target_nick.to_string(), channel_name.to_string()))?;

    let user = client.user.read().await.clone().unwrap_or_default();
    let kick_line = format!(
        ":{nick}!{user}@{} KICK {channel_name} {target_nick} :{reason}",
        client.addr.ip()
    );
    broadcast_to_channel(&channel, kick_line);
    channel.remove_member(target.id).await;
    target.channels.remove(channel_name);
    let _ = target
        .tx_control
        .send(SubscriptionControl::Unsubscribe(channel_name.to_string()))
        .await;
    ctx.state.remove_channel_if_empty(channel_name);
    Ok(())
}

pub async fn handle_names(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    match msg.params.first() {
        Some(targets) => {
            for channel_name in targets.split(',') {
                send_names_reply(ctx, client, &nick, channel_name).await;
            }
        }
        None => {
            for channel in ctx.state.all_channels() {
                send_names_reply(ctx, client, &nick, &channel.name).await;
            }
        }
    }
    Ok(())
}

async fn send_names_reply(ctx: &HandlerContext, client: &ClientRecord, nick: &str, channel_name: &str) {
    let server_name = ctx.config.server.name.clone();
    let Some(channel) = ctx.state.get_channel(channel_name) else {
        return;
    };
    let mut names = Vec::new();
    for member_id in channel.members.iter().map(|m| *m) {
        let Some(member) = ctx.state.get_client(member_id) else { continue };
        let member_nick = member.current_nick().await.unwrap_or_default();
        let prefixed = if channel.is_operator(member_id) {
            format!("@{member_nick}")
        } else if channel.voiced.contains(&member_id) {
            format!("+{member_nick}")
        } else {
            member_nick
        };
        names.push(prefixed);
    }
    send_reply(
        client,
        &server_name,
        &IrcReply::NamReply { nick: nick.to_string(), symbol: '=', channel: channel_name.to_string(), names },
    )
    .await;
    send_reply(
        client,
        &server_name,
        &IrcReply::EndOfNames { nick: nick.to_string(), channel: channel_name.to_string() },
    )
    .await;
}

pub async fn handle_list(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let wanted: Option<Vec<&str>> = msg.params.first().map(|s| s.split(',').collect());

    for channel in ctx.state.all_channels() {
        if let Some(filter) = &wanted {
            if !filter.contains(&channel.name.as_str()) {
                continue;
            }
        }
        let topic = channel.topic.read().await.text.clone().unwrap_or_default();
        send_reply(
            client,
            &server_name,
            &IrcReply::List { nick: nick.clone(), channel: channel.name.clone(), visible: channel.members.len(), topic },
        )
        .await;
    }
    send_reply(client, &server_name, &IrcReply::ListEnd { nick }).await;
    Ok(())
}

pub async fn handle_who(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();
    let mask = msg.params.first().cloned().unwrap_or_else(|| "*".to_string());

    if let Some(channel) = ctx.state.get_channel(&mask) {
        let requester_in_channel = channel.members.contains(&client.id);
        for member_id in channel.members.iter().map(|m| *m) {
            let Some(member) = ctx.state.get_client(member_id) else { continue };
            if !requester_in_channel && member.modes.read().await.contains(&'i') {
                continue;
            }
            send_who_line(ctx, client, &nick, &channel.name, &member, channel.is_operator(member_id)).await;
        }
    } else {
        for id in ctx.state.all_client_ids() {
            let Some(member) = ctx.state.get_client(id) else { continue };
            let member_nick = member.current_nick().await.unwrap_or_default();
            if !(member_nick.eq_ignore_ascii_case(&mask) || mask == "*") {
                continue;
            }
            if member.modes.read().await.contains(&'i') && member.id != client.id {
                continue;
            }
            send_who_line(ctx, client, &nick, "*", &member, false).await;
        }
    }
    send_reply(client, &server_name, &IrcReply::EndOfWho { nick, mask }).await;
    Ok(())
}

async fn send_who_line(
    ctx: &HandlerContext,
    client: &ClientRecord,
    nick: &str,
    channel_name: &str,
    member: &ClientRecord,
    is_operator: bool,
) {
    let server_name = ctx.config.server.name.clone();
    let member_nick = member.current_nick().await.unwrap_or_default();
    let member_user = member.user.read().await.clone().unwrap_or_default();
    let member_realname = member.realname.read().await.clone().unwrap_or_default();
    let flags = if is_operator { "H@" } else { "H" };
    send_reply(
        client,
        &server_name,
        &IrcReply::WhoReply {
            nick: nick.to_string(),
            channel: channel_name.to_string(),
            user: member_user,
            host: member.addr.ip().to_string(),
            target: member_nick,
            flags: flags.to_string(),
            realname: member_realname,
        },
    )
    .await;
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}


/// Channel MODE: query form (`MODE #x`) and the `+/-itnkl` flags with their positional
/// parameters (`MODE #x +k secret`, `MODE #x +o alice`).
pub async fn handle_channel_mode(
    ctx: &HandlerContext,
    client: &Arc<ClientRecord>,
    msg: &Message,
) -> HandlerResult {
    require_registered(client)?;
    let channel_name = require_param(&msg.params, 0, "MODE")?;
    let nick = client.current_nick().await.unwrap_or_default();
    let server_name = ctx.config.server.name.clone();

    let channel = ctx
        .state
        .get_channel(channel_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(channel_name.to_string()))?;

    let Some(flags) = msg.params.get(1) else {
        let modes = channel.modes.read().await;
        send_reply(
            client,
            &server_name,
            &IrcReply::ChannelModeIs { nick, channel: channel_name.to_string(), modes: modes.render() },
        )
        .await;
        return Ok(());
    };

    if !channel.is_operator(client.id) {
        return Err(HandlerError::ChanOPrivsNeeded(channel_name.to_string()));
    }

    let mut sign = '+';
    let mut extra_params = msg.params.iter().skip(2);
    let mut applied = String::new();
    let mut applied_params = Vec::new();

    for flag in flags.chars() {
        match flag {
            '+' | '-' => sign = flag,
            'i' => {
                channel.modes.write().await.invite_only = sign == '+';
                applied.push(sign);
                applied.push('i');
            }
            'n' => {
                channel.modes.write().await.no_external_msgs = sign == '+';
                applied.push(sign);
                applied.push('n');
            }
            't' => {
                channel.modes.write().await.topic_lock = sign == '+';
                applied.push(sign);
                applied.push('t');
            }
            'k' => {
                if sign == '+' {
                    if let Some(key) = extra_params.next() {
                        channel.modes.write().await.key = Some(key.clone());
                        applied.push(sign);
                        applied.push('k');
                        applied_params.push(key.clone());
                    }
                } else {
                    channel.modes.write().await.key = None;
                    applied.push(sign);
                    applied.push('k');
                }
            }
            'l' => {
                if sign == '+' {
                    if let Some(limit) = extra_params.next().and_then(|s| s.parse::<usize>().ok()) {
                        channel.modes.write().await.user_limit = Some(limit);
                        applied.push(sign);
                        applied.push('l');
                        applied_params.push(limit.to_string());
                    }
                } else {
                    channel.modes.write().await.user_limit = None;
                    applied.push(sign);
                    applied.push('l');
                }
            }
            'o' | 'v' => {
                if let Some(target_nick) = extra_params.next() {
                    if let Some(target) = ctx.state.find_by_nick(target_nick) {
                        if channel.members.contains(&target.id) {
                            let set = if flag == 'o' { &channel.operators } else { &channel.voiced };
                            if sign == '+' {
                                set.insert(target.id);
                            } else {
                                set.remove(&target.id);
                            }
                            applied.push(sign);
                            applied.push(flag);
                            applied_params.push(target_nick.clone());
                        }
                    }
                }
            }
            _ => return Err(HandlerError::UModeUnknownFlag),
        }
    }

    if !applied.is_empty() {
        let user = client.user.read().await.clone().unwrap_or_default();
        let params_suffix = if applied_params.is_empty() {
            String::new()
        } else {
            format!(" {}", applied_params.join(" "))
        };
        let line = format!(
            ":{nick}!{user}@{} MODE {channel_name} {applied}{params_suffix}",
            client.addr.ip()
        );
        broadcast_to_channel(&channel, line);
    }
    Ok(())
}
