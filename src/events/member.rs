use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::{Data, Error};

/// Handle a new member joining a guild: start their verification session.
pub async fn handle_member_add(
    _ctx: &serenity::Context,
    new_member: &serenity::Member,
    data: &Data,
) -> Result<(), Error> {
    // Automated accounts are outside verification entirely
    if new_member.user.bot {
        return Ok(());
    }

    info!(
        "New member joined: {} in guild {}",
        new_member.user.name, new_member.guild_id
    );

    let sessions = data.sessions.clone();
    let user = new_member.user.id;
    let username = new_member.user.name.clone();
    let guild = new_member.guild_id;
    tokio::spawn(async move {
        if let Err(e) = sessions.verify_member(user, &username, guild).await {
            warn!("Verification for {} did not complete: {}", username, e);
        }
    });

    Ok(())
}
