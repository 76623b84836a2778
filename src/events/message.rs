use poise::serenity_prelude as serenity;
use tracing::debug;

use crate::events::waiter::GatewayEvent;
use crate::{Data, Error};

/// Handle incoming messages. Direct messages are offered to waiting
/// verification sessions; everything else is not ours to act on.
pub async fn handle_message(
    _ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if msg.author.bot {
        return Ok(());
    }

    if msg.guild_id.is_none() {
        let event = GatewayEvent::DirectMessage {
            author: msg.author.id,
            channel: msg.channel_id,
        };
        if data.waiter.notify(&event) {
            debug!("Routed direct message from {} to a waiting session", msg.author.name);
        }
    }

    Ok(())
}
