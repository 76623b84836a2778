use poise::serenity_prelude::GuildId;
use tracing::debug;

use crate::error::{BotError, Result};
use crate::platform::{ChannelSummary, ChatPlatform};

/// Create a single-use re-invite for a member who is about to be removed,
/// on the guild's topmost text channel. Returns the invite URL.
pub async fn create_reinvite(
    platform: &dyn ChatPlatform,
    guild: GuildId,
    username: &str,
    reason: &str,
) -> Result<String> {
    let channels = platform.text_channels(guild).await?;

    // Lowest position wins; first encountered on a tie
    let mut target: Option<&ChannelSummary> = None;
    for channel in &channels {
        if target.map_or(true, |best| channel.position < best.position) {
            target = Some(channel);
        }
    }
    let target = target.ok_or(BotError::NoTextChannels { guild })?;
    debug!("Attaching re-invite to #{} ({}) in guild {}", target.name, target.id, guild);

    let audit_reason = format!("Re-invite for {}: {}", username, reason);
    platform.create_invite(target.id, &audit_reason).await
}
