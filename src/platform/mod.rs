pub mod discord;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};

use crate::error::Result;

pub use discord::DiscordPlatform;

/// A guild role as the core sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

/// A guild text channel, with the ordering position Discord displays it at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: ChannelId,
    pub name: String,
    pub position: u16,
}

/// A guild member row, as returned by the member listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub is_bot: bool,
}

/// Handle for updating the message a button press originated from,
/// after the press has been acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionHandle {
    pub token: String,
}

/// An interactive button attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageButton {
    Action {
        custom_id: String,
        label: String,
        emoji: Option<char>,
    },
    Link {
        url: String,
        label: String,
    },
}

/// An outbound chat message: plain text plus any buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: String,
    pub buttons: Vec<MessageButton>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_button(mut self, button: MessageButton) -> Self {
        self.buttons.push(button);
        self
    }
}

/// The chat platform surface the verification core drives. Everything here
/// maps to a Discord REST call in production; tests substitute an in-memory
/// implementation.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Open (or reuse) a direct channel to a user
    async fn open_dm(&self, user: UserId) -> Result<ChannelId>;

    async fn send_message(&self, channel: ChannelId, message: OutboundMessage) -> Result<()>;

    /// Replace the content and components of the message an acknowledged
    /// button press originated from
    async fn edit_interaction_message(
        &self,
        interaction: &InteractionHandle,
        message: OutboundMessage,
    ) -> Result<()>;

    async fn guild_name(&self, guild: GuildId) -> Result<String>;

    async fn guild_roles(&self, guild: GuildId) -> Result<Vec<RoleInfo>>;

    async fn create_role(&self, guild: GuildId, name: &str, reason: &str) -> Result<RoleInfo>;

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId, reason: &str)
        -> Result<()>;

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()>;

    /// The roles a member currently holds, freshly fetched
    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>>;

    async fn list_members(&self, guild: GuildId) -> Result<Vec<MemberProfile>>;

    async fn text_channels(&self, guild: GuildId) -> Result<Vec<ChannelSummary>>;

    /// Create a single-use invite on a channel, returning its URL
    async fn create_invite(&self, channel: ChannelId, reason: &str) -> Result<String>;

    async fn kick(&self, guild: GuildId, user: UserId, reason: &str) -> Result<()>;
}
