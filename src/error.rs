use thiserror::Error;

use poise::serenity_prelude::{GuildId, UserId};

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing environment variable: {name}")]
    MissingEnv { name: String },

    // Verification errors
    #[error("Verification already in progress for user {user} in guild {guild}")]
    VerificationInProgress { user: UserId, guild: GuildId },

    #[error("Verification failed for {username}: {reason}")]
    VerificationFailed { username: String, reason: String },

    // Identity service errors (transport/config trouble, never a plain denial)
    #[error("Identity service error: {message}")]
    AuthService { message: String },

    // Discord errors
    #[error("No role named '{name}' found in guild {guild} - please create a role called '{name}' (case-insensitive)")]
    RoleNotFound { guild: GuildId, name: String },

    #[error("No text channels in guild {guild} to attach a re-invite to")]
    NoTextChannels { guild: GuildId },

    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::AuthService {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
