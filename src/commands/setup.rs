use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::events::interaction::{
    COLOUR_BUTTON_PREFIX, PRONOUN_BUTTON_PREFIX, ROLE_BUTTON_PREFIX, VERIFY_BUTTON_GUILD_PREFIX,
};
use crate::{Context, Error};

/// The setup commands post persistent controls into the current channel,
/// so they are reserved for the guild owner.
async fn ensure_guild_owner(ctx: &Context<'_>) -> Result<Option<serenity::GuildId>, Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(None);
    };
    let owner_id = guild_id.to_partial_guild(ctx.http()).await?.owner_id;
    if owner_id != ctx.author().id {
        ctx.send(
            poise::CreateReply::default()
                .content("You're not authorised to run that command :c sorry! Ask your server owner.")
                .ephemeral(true),
        )
        .await?;
        return Ok(None);
    }
    Ok(Some(guild_id))
}

/// Post a picker message whose buttons toggle the named roles.
async fn post_picker(
    ctx: &Context<'_>,
    content: &str,
    prefix: &str,
    mut options: Vec<String>,
) -> Result<(), Error> {
    if options.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("No options configured for this picker - add some to the config file first.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    // Discord caps components at 5 buttons per row, 5 rows per message
    if options.len() > 25 {
        warn!("Picker has {} options, truncating to 25", options.len());
        options.truncate(25);
    }
    let rows: Vec<serenity::CreateActionRow> = options
        .chunks(5)
        .map(|chunk| {
            serenity::CreateActionRow::Buttons(
                chunk
                    .iter()
                    .map(|name| {
                        serenity::CreateButton::new(format!("{}{}", prefix, name))
                            .label(name.as_str())
                            .style(serenity::ButtonStyle::Secondary)
                    })
                    .collect(),
            )
        })
        .collect();

    ctx.channel_id()
        .send_message(
            ctx.http(),
            serenity::CreateMessage::new().content(content).components(rows),
        )
        .await?;
    ctx.send(
        poise::CreateReply::default()
            .content("Picker posted!")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Insert a verification button in the current channel - for server owners only!
#[poise::command(slash_command, guild_only)]
pub async fn verification_button(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ensure_guild_owner(&ctx).await? else {
        return Ok(());
    };

    let button = serenity::CreateButton::new(format!("{}{}", VERIFY_BUTTON_GUILD_PREFIX, guild_id))
        .label("Verify me!")
        .style(serenity::ButtonStyle::Primary)
        .emoji(serenity::ReactionType::Unicode("🎓".to_string()));
    ctx.channel_id()
        .send_message(
            ctx.http(),
            serenity::CreateMessage::new()
                .content("Hit the button below to verify that you're a student.")
                .components(vec![serenity::CreateActionRow::Buttons(vec![button])]),
        )
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content("Verification button posted!")
            .ephemeral(true),
    )
    .await?;
    info!(
        "Verification button created in guild {} by {}",
        guild_id,
        ctx.author().name
    );
    Ok(())
}

/// Insert a colour picker in the current channel - for server owners only!
#[poise::command(slash_command, guild_only)]
pub async fn colour_picker(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ensure_guild_owner(&ctx).await? else {
        return Ok(());
    };
    let colours = ctx
        .data()
        .config
        .guild(guild_id)
        .map(|guild| guild.colours.clone())
        .unwrap_or_default();
    post_picker(&ctx, "Pick a colour for your name!", COLOUR_BUTTON_PREFIX, colours).await
}

/// Insert a pronoun picker in the current channel - for server owners only!
#[poise::command(slash_command, guild_only)]
pub async fn pronoun_picker(ctx: Context<'_>) -> Result<(), Error> {
    if ensure_guild_owner(&ctx).await?.is_none() {
        return Ok(());
    }
    let pronouns = ctx.data().config.pronouns.clone();
    post_picker(
        &ctx,
        "Pick your pronouns! Press again to take a role off.",
        PRONOUN_BUTTON_PREFIX,
        pronouns,
    )
    .await
}

/// Insert a general role picker in the current channel - for server owners only!
#[poise::command(slash_command, guild_only)]
pub async fn role_picker(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ensure_guild_owner(&ctx).await? else {
        return Ok(());
    };
    let roles = ctx
        .data()
        .config
        .guild(guild_id)
        .map(|guild| guild.roles.clone())
        .unwrap_or_default();
    post_picker(&ctx, "Grab whichever roles suit you!", ROLE_BUTTON_PREFIX, roles).await
}
