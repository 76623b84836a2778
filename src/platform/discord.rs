use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serenity::{ChannelId, GuildId, Http, RoleId, UserId};
use tracing::debug;

use crate::error::Result;
use crate::platform::{
    ChannelSummary, ChatPlatform, InteractionHandle, MemberProfile, MessageButton,
    OutboundMessage, RoleInfo,
};

/// Discord-backed [`ChatPlatform`] over the REST API. Works with or without
/// a gateway connection, so the batch modes can share it.
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn build_components(buttons: &[MessageButton]) -> Vec<serenity::CreateActionRow> {
    buttons
        .chunks(5)
        .map(|chunk| {
            serenity::CreateActionRow::Buttons(chunk.iter().map(build_button).collect())
        })
        .collect()
}

fn build_button(button: &MessageButton) -> serenity::CreateButton {
    match button {
        MessageButton::Action {
            custom_id,
            label,
            emoji,
        } => {
            let mut built = serenity::CreateButton::new(custom_id.as_str())
                .label(label.as_str())
                .style(serenity::ButtonStyle::Primary);
            if let Some(emoji) = emoji {
                built = built.emoji(serenity::ReactionType::Unicode(emoji.to_string()));
            }
            built
        }
        MessageButton::Link { url, label } => {
            serenity::CreateButton::new_link(url.as_str()).label(label.as_str())
        }
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn open_dm(&self, user: UserId) -> Result<ChannelId> {
        let user = self.http.get_user(user).await?;
        let channel = user.create_dm_channel(&self.http).await?;
        Ok(channel.id)
    }

    async fn send_message(&self, channel: ChannelId, message: OutboundMessage) -> Result<()> {
        let mut builder = serenity::CreateMessage::new().content(message.content);
        if !message.buttons.is_empty() {
            builder = builder.components(build_components(&message.buttons));
        }
        channel.send_message(&self.http, builder).await?;
        Ok(())
    }

    async fn edit_interaction_message(
        &self,
        interaction: &InteractionHandle,
        message: OutboundMessage,
    ) -> Result<()> {
        let builder = serenity::EditInteractionResponse::new()
            .content(message.content)
            .components(build_components(&message.buttons));
        self.http
            .edit_original_interaction_response(&interaction.token, &builder, Vec::new())
            .await?;
        Ok(())
    }

    async fn guild_name(&self, guild: GuildId) -> Result<String> {
        Ok(self.http.get_guild(guild).await?.name)
    }

    async fn guild_roles(&self, guild: GuildId) -> Result<Vec<RoleInfo>> {
        let roles = guild.roles(&self.http).await?;
        Ok(roles
            .into_iter()
            .map(|(id, role)| RoleInfo {
                id,
                name: role.name,
            })
            .collect())
    }

    async fn create_role(&self, guild: GuildId, name: &str, reason: &str) -> Result<RoleInfo> {
        let role = guild
            .create_role(
                &self.http,
                serenity::EditRole::new().name(name).audit_log_reason(reason),
            )
            .await?;
        debug!("Created role '{}' with ID {} in guild {}", name, role.id, guild);
        Ok(RoleInfo {
            id: role.id,
            name: role.name,
        })
    }

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        self.http
            .add_member_role(guild, user, role, Some(reason))
            .await?;
        Ok(())
    }

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        self.http
            .remove_member_role(guild, user, role, Some(reason))
            .await?;
        Ok(())
    }

    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>> {
        let member = guild.member(&self.http, user).await?;
        Ok(member.roles)
    }

    async fn list_members(&self, guild: GuildId) -> Result<Vec<MemberProfile>> {
        // The member endpoint is paginated; walk it to the end
        let mut members = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = guild.members(&self.http, Some(1000), after).await?;
            let last = page.last().map(|m| m.user.id);
            members.extend(page.into_iter().map(|m| MemberProfile {
                user_id: m.user.id,
                display_name: m.user.name.clone(),
                is_bot: m.user.bot,
            }));
            match last {
                Some(id) => after = Some(id),
                None => break,
            }
        }
        Ok(members)
    }

    async fn text_channels(&self, guild: GuildId) -> Result<Vec<ChannelSummary>> {
        let channels = guild.channels(&self.http).await?;
        Ok(channels
            .into_iter()
            .filter(|(_, channel)| channel.kind == serenity::ChannelType::Text)
            .map(|(id, channel)| ChannelSummary {
                id,
                name: channel.name,
                position: channel.position,
            })
            .collect())
    }

    async fn create_invite(&self, channel: ChannelId, reason: &str) -> Result<String> {
        let invite = channel
            .create_invite(
                &self.http,
                serenity::CreateInvite::new()
                    .max_uses(1)
                    .unique(true)
                    .audit_log_reason(reason),
            )
            .await?;
        Ok(invite.url())
    }

    async fn kick(&self, guild: GuildId, user: UserId, reason: &str) -> Result<()> {
        guild.kick_with_reason(&self.http, user, reason).await?;
        Ok(())
    }
}
