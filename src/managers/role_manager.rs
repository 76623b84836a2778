use std::collections::HashMap;
use std::sync::Arc;

use poise::serenity_prelude::{GuildId, RoleId, UserId};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{BotError, Result};
use crate::platform::ChatPlatform;

/// The role whose presence gates guild access. Matched case-insensitively.
pub const VERIFIED_ROLE_NAME: &str = "verified";

/// Resolves, caches, creates and toggles guild roles by name.
pub struct RoleManager {
    /// Per-guild verified-role cache, held for the process lifetime.
    /// Never invalidated: renaming or deleting the role while the bot runs
    /// leaves a stale entry.
    verified: Mutex<HashMap<GuildId, RoleId>>,

    /// Per-guild locks serialising lookup-then-create, so two sessions
    /// racing on a missing role cannot both create it
    guild_locks: Mutex<HashMap<GuildId, Arc<Mutex<()>>>>,
}

impl RoleManager {
    pub fn new() -> Self {
        Self {
            verified: Mutex::new(HashMap::new()),
            guild_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn guild_lock(&self, guild: GuildId) -> Arc<Mutex<()>> {
        let mut locks = self.guild_locks.lock().await;
        locks.entry(guild).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Find the guild's "verified" role, from cache where possible
    pub async fn resolve_verified_role(
        &self,
        platform: &dyn ChatPlatform,
        guild: GuildId,
    ) -> Result<RoleId> {
        if let Some(id) = self.verified.lock().await.get(&guild) {
            return Ok(*id);
        }

        let roles = platform.guild_roles(guild).await?;
        let found = roles
            .into_iter()
            .find(|role| role.name.eq_ignore_ascii_case(VERIFIED_ROLE_NAME));

        match found {
            Some(role) => {
                self.verified.lock().await.insert(guild, role.id);
                Ok(role.id)
            }
            None => Err(BotError::RoleNotFound {
                guild,
                name: VERIFIED_ROLE_NAME.to_string(),
            }),
        }
    }

    /// Toggle a role on a member by name, creating the role first if the
    /// guild does not have it. Returns whether the member now holds it.
    pub async fn toggle_role(
        &self,
        platform: &dyn ChatPlatform,
        guild: GuildId,
        user: UserId,
        role_name: &str,
        audit_reason: &str,
    ) -> Result<bool> {
        let lock = self.guild_lock(guild).await;
        let _guard = lock.lock().await;

        let roles = platform.guild_roles(guild).await?;
        let role = roles
            .into_iter()
            .find(|role| role.name.eq_ignore_ascii_case(role_name));
        let role = match role {
            Some(role) => role,
            None => platform.create_role(guild, role_name, audit_reason).await?,
        };

        let current = platform.member_roles(guild, user).await?;
        if current.contains(&role.id) {
            platform.remove_role(guild, user, role.id, audit_reason).await?;
            info!("Removed role '{}' from user {} in guild {}", role.name, user, guild);
            Ok(false)
        } else {
            platform.add_role(guild, user, role.id, audit_reason).await?;
            info!("Assigned role '{}' to user {} in guild {}", role.name, user, guild);
            Ok(true)
        }
    }
}

impl Default for RoleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared role manager type
pub type SharedRoleManager = Arc<RoleManager>;

pub fn create_shared_role_manager() -> SharedRoleManager {
    Arc::new(RoleManager::new())
}
