use std::collections::HashMap;

use poise::serenity_prelude::GuildId;
use serde::{Deserialize, Serialize};

use crate::auth::StudentType;
use crate::error::{BotError, Result};

/// Top-level bot configuration, loaded from a JSON file at startup.
/// Read-only for the lifetime of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Maps guild IDs (as strings) to their configuration
    #[serde(default)]
    pub guilds: HashMap<String, GuildConfig>,

    /// Pronoun options offered by the pronoun picker, shared by all guilds
    #[serde(default)]
    pub pronouns: Vec<String>,

    /// Linked from the verification instructions so members know what
    /// happens to their data. Omitted from the message when empty.
    #[serde(default)]
    pub data_policy_url: String,
}

/// Configuration for a specific guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Alumni guilds accept alumni credentials instead of current-student ones
    #[serde(default)]
    pub alumni_guild: bool,

    /// Colour role options offered by the colour picker
    #[serde(default)]
    pub colours: Vec<String>,

    /// Generic role options offered by the role picker
    #[serde(default)]
    pub roles: Vec<String>,

    /// Maps channel IDs (as strings) to their configuration
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

/// Configuration for a specific channel in a guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Messages older than this many seconds are deleted by the reaper
    pub reap_after_secs: u64,
}

impl BotConfig {
    /// Load the configuration from a JSON file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BotError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| BotError::ConfigParse {
            path: path.to_string(),
            source: e,
        })
    }

    /// Get the configuration for a guild, if any
    pub fn guild(&self, guild_id: GuildId) -> Option<&GuildConfig> {
        self.guilds.get(&guild_id.to_string())
    }

    /// Which kind of student credential this guild accepts
    pub fn student_type(&self, guild_id: GuildId) -> StudentType {
        match self.guild(guild_id) {
            Some(config) if config.alumni_guild => StudentType::Alumnus,
            _ => StudentType::CurrentStudent,
        }
    }
}
