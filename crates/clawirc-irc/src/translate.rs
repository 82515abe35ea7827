use chrono::{DateTime, Utc};
use irc::client::prelude::{Command, Message, Response};

use clawirc_core::domain::InboundEvent;

/// Map one inbound protocol message to a core event. Everything the controller
/// has no use for (PING, MOTD, NAMES, ...) maps to `None`.
pub fn translate(message: &Message, received_at: DateTime<Utc>) -> Option<InboundEvent> {
    let nick = || message.source_nickname().unwrap_or_default().to_string();

    match &message.command {
        Command::Response(resp, args) if resp.is_error() => Some(InboundEvent::ProtocolError {
            message: match args.last() {
                Some(text) => format!("{resp:?}: {text}"),
                None => format!("{resp:?}"),
            },
        }),
        Command::Response(Response::RPL_WELCOME, _) => Some(InboundEvent::Registered),
        Command::JOIN(channel, _, _) => Some(InboundEvent::Joined {
            channel: channel.clone(),
            nick: nick(),
        }),
        Command::PRIVMSG(target, text) => Some(InboundEvent::Message {
            target: target.clone(),
            nick: nick(),
            text: text.clone(),
            received_at,
        }),
        Command::ERROR(text) => Some(InboundEvent::ProtocolError {
            message: text.clone(),
        }),
        _ => None,
    }
}
