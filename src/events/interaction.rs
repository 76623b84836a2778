use poise::serenity_prelude as serenity;
use serenity::{ComponentInteraction, GuildId};
use tracing::{debug, warn};

use crate::events::waiter::GatewayEvent;
use crate::messages;
use crate::platform::InteractionHandle;
use crate::{Data, Error};

pub const COLOUR_BUTTON_PREFIX: &str = "colour_button_";
pub const PRONOUN_BUTTON_PREFIX: &str = "pronoun_button_";
pub const ROLE_BUTTON_PREFIX: &str = "role_button_";
pub const VERIFY_BUTTON_GUILD_PREFIX: &str = "verify_button_guild_";
pub const VERIFYME_BUTTON_GUILD_PREFIX: &str = "verifyme_button_guild_";
pub const SESSION_BUTTON_PREFIX: &str = "ive_verified_";

/// The custom ID of a session's "I've verified" button for a guild.
pub fn session_button_id(guild: GuildId) -> String {
    format!("{}{}", SESSION_BUTTON_PREFIX, guild)
}

/// Where a button press should be routed.
#[derive(Debug, PartialEq, Eq)]
pub enum ButtonRoute {
    /// A picker button toggling a role on the presser
    ToggleRole {
        role_name: String,
        audit_reason: &'static str,
    },
    /// A "verify me" button starting a verification session
    StartVerification { guild: GuildId },
    /// A session's own "I've verified" button
    SessionSignal { guild: GuildId },
}

/// Decode a component custom ID into a route. Unknown IDs are not ours.
pub fn route_button(custom_id: &str) -> Option<ButtonRoute> {
    if let Some(name) = custom_id.strip_prefix(COLOUR_BUTTON_PREFIX) {
        return Some(ButtonRoute::ToggleRole {
            role_name: name.to_string(),
            audit_reason: "requested colour role",
        });
    }
    if let Some(name) = custom_id.strip_prefix(PRONOUN_BUTTON_PREFIX) {
        return Some(ButtonRoute::ToggleRole {
            role_name: name.to_string(),
            audit_reason: "requested pronoun role",
        });
    }
    if let Some(name) = custom_id.strip_prefix(ROLE_BUTTON_PREFIX) {
        return Some(ButtonRoute::ToggleRole {
            role_name: name.to_string(),
            audit_reason: "requested generic role",
        });
    }
    if let Some(id) = custom_id.strip_prefix(VERIFY_BUTTON_GUILD_PREFIX) {
        return parse_guild(id).map(|guild| ButtonRoute::StartVerification { guild });
    }
    if let Some(id) = custom_id.strip_prefix(VERIFYME_BUTTON_GUILD_PREFIX) {
        return parse_guild(id).map(|guild| ButtonRoute::StartVerification { guild });
    }
    if let Some(id) = custom_id.strip_prefix(SESSION_BUTTON_PREFIX) {
        return parse_guild(id).map(|guild| ButtonRoute::SessionSignal { guild });
    }
    None
}

fn parse_guild(id: &str) -> Option<GuildId> {
    id.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

/// Handle a component interaction from the gateway.
pub async fn handle_component(
    ctx: &serenity::Context,
    interaction: &ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let custom_id = interaction.data.custom_id.as_str();
    let Some(route) = route_button(custom_id) else {
        return Ok(());
    };

    match route {
        ButtonRoute::SessionSignal { guild } => {
            // Acknowledge as a deferred update so the waiting session can
            // rewrite the button message once it has an answer
            interaction
                .create_response(&ctx.http, serenity::CreateInteractionResponse::Acknowledge)
                .await?;
            let event = GatewayEvent::ButtonPress {
                user: interaction.user.id,
                channel: interaction.channel_id,
                custom_id: custom_id.to_string(),
                interaction: InteractionHandle {
                    token: interaction.token.clone(),
                },
            };
            if !data.waiter.notify(&event) {
                debug!(
                    "No verification session waiting on button {} for guild {}",
                    custom_id, guild
                );
            }
        }
        ButtonRoute::ToggleRole {
            role_name,
            audit_reason,
        } => {
            let Some(guild) = interaction.guild_id else {
                return Ok(());
            };
            let assigned = data
                .roles
                .toggle_role(
                    data.platform.as_ref(),
                    guild,
                    interaction.user.id,
                    &role_name,
                    audit_reason,
                )
                .await?;
            let content = if assigned {
                format!("Gave you the **{}** role! 🎉", role_name)
            } else {
                format!("Took away the **{}** role.", role_name)
            };
            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::Message(
                        serenity::CreateInteractionResponseMessage::new()
                            .content(content)
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
        ButtonRoute::StartVerification { guild } => {
            if interaction.user.bot {
                return Ok(());
            }
            interaction
                .create_response(
                    &ctx.http,
                    serenity::CreateInteractionResponse::Message(
                        serenity::CreateInteractionResponseMessage::new()
                            .content(messages::verification_started_ack())
                            .ephemeral(true),
                    ),
                )
                .await?;

            let sessions = data.sessions.clone();
            let user = interaction.user.id;
            let username = interaction.user.name.clone();
            tokio::spawn(async move {
                if let Err(e) = sessions.verify_member(user, &username, guild).await {
                    warn!("Verification for {} did not complete: {}", username, e);
                }
            });
        }
    }
    Ok(())
}
