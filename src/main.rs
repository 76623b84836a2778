use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use tracing::{error, info, warn};

mod auth;
mod commands;
mod config;
mod error;
mod events;
mod managers;
mod messages;
mod platform;
mod reaper;

use auth::{AuthClient, Authenticator};
use commands::{colour_picker, ping, pronoun_picker, role_picker, verification_button};
use config::BotConfig;
use events::{
    create_shared_event_waiter, handle_component, handle_member_add, handle_message,
    SharedEventWaiter,
};
use managers::{
    create_shared_role_manager, create_shared_session_coordinator, InvalidMemberScanner,
    SharedRoleManager, SharedSessionCoordinator,
};
use platform::{ChatPlatform, DiscordPlatform};

/// Discord bot gating guild access behind student identity verification
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Delete old messages from configured channels, then exit
    #[arg(long)]
    reaper: bool,

    /// Warn members who are no longer correctly verified, then exit
    #[arg(long)]
    warn_invalid: bool,

    /// With --warn-invalid: only log who would be warned, message nobody
    #[arg(long)]
    warn_invalid_dry_run: bool,

    /// Timeframe quoted to warned members before their removal
    #[arg(long, default_value = "a few days")]
    warn_invalid_deadline: String,

    /// Kick members who are no longer correctly verified, then exit
    #[arg(long)]
    purge_invalid: bool,
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub config: Arc<BotConfig>,
    pub platform: Arc<dyn ChatPlatform>,
    pub waiter: SharedEventWaiter,
    pub roles: SharedRoleManager,
    pub sessions: SharedSessionCoordinator,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = handle_message(ctx, new_message, data).await {
                error!("Failed to handle message: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = handle_member_add(ctx, new_member, data).await {
                error!("Failed to handle new member: {}", e);
            }
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let serenity::Interaction::Component(component) = interaction {
                if let Err(e) = handle_component(ctx, component, data).await {
                    error!("Failed to handle component interaction: {}", e);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_guild_key(key: &str) -> Option<serenity::GuildId> {
    match key.parse::<u64>() {
        Ok(id) if id != 0 => Some(serenity::GuildId::new(id)),
        _ => {
            warn!("Ignoring invalid guild id '{}' in config", key);
            None
        }
    }
}

/// Run one of the one-shot batch modes over a plain REST client.
async fn run_batch_mode(args: &Args, token: &str, config: &BotConfig) -> Result<()> {
    let http = Arc::new(serenity::Http::new(token));

    if args.reaper {
        info!("Reaper mode active");
        for (guild_key, guild_config) in &config.guilds {
            for (channel_key, channel_config) in &guild_config.channels {
                let channel = match channel_key.parse::<u64>() {
                    Ok(id) if id != 0 => serenity::ChannelId::new(id),
                    _ => {
                        warn!("Ignoring invalid channel id '{}' in config", channel_key);
                        continue;
                    }
                };
                info!("Reaping channel {} from guild {}", channel, guild_key);
                if let Err(e) = reaper::reap_channel_messages(
                    &http,
                    channel,
                    chrono::Duration::seconds(channel_config.reap_after_secs as i64),
                )
                .await
                {
                    error!(
                        "Failed reaping channel {} from guild {}: {}",
                        channel, guild_key, e
                    );
                }
            }
        }
        info!("Reaping done, ending");
        return Ok(());
    }

    let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordPlatform::new(http));
    let auth: Arc<dyn Authenticator> = Arc::new(AuthClient::from_env()?);
    let scanner = InvalidMemberScanner::new(platform, auth);

    if args.warn_invalid {
        info!("Invalid member warning mode active");
        for (guild_key, guild_config) in &config.guilds {
            // For now, alumni guilds sit out the warning and purge sweeps
            if guild_config.alumni_guild {
                continue;
            }
            let Some(guild) = parse_guild_key(guild_key) else {
                continue;
            };
            if let Err(e) = scanner
                .warn_invalid_members(
                    guild,
                    config.student_type(guild),
                    &args.warn_invalid_deadline,
                    args.warn_invalid_dry_run,
                )
                .await
            {
                error!("Failed warning members of guild {}: {}", guild, e);
            }
        }
        info!("Invalid member warning done, ending");
    } else if args.purge_invalid {
        info!("Invalid member purging mode active");
        for (guild_key, guild_config) in &config.guilds {
            if guild_config.alumni_guild {
                continue;
            }
            let Some(guild) = parse_guild_key(guild_key) else {
                continue;
            };
            if let Err(e) = scanner
                .purge_invalid_members(guild, config.student_type(guild))
                .await
            {
                error!("Failed purging members of guild {}: {}", guild, e);
            }
        }
        info!("Invalid member purging done, ending");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    let token = std::env::var("DISCORD_TOKEN").expect("Missing DISCORD_TOKEN environment variable");

    // Extract bot/application ID from token (first part before the dot, base64 encoded)
    if let Some(bot_id_b64) = token.split('.').next() {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(bot_id_b64)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(bot_id_b64));
        if let Ok(decoded) = decoded {
            if let Ok(id_str) = String::from_utf8(decoded) {
                info!("Bot ID: {}", id_str);
            }
        }
    }

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    info!("Loading configuration from {}...", config_path);
    let config = Arc::new(BotConfig::load_from_file(&config_path)?);

    if args.reaper || args.warn_invalid || args.purge_invalid {
        return run_batch_mode(&args, &token, &config).await;
    }

    let auth: Arc<dyn Authenticator> = Arc::new(AuthClient::from_env()?);
    let waiter = create_shared_event_waiter();
    let roles = create_shared_role_manager();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                ping(),
                verification_button(),
                colour_picker(),
                pronoun_picker(),
                role_picker(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx.say(format!("An error occurred: {}", error)).await;
                        }
                        poise::FrameworkError::GuildOnly { ctx, .. } => {
                            error!(
                                "Command '{}' is guild-only, used in DM by {}",
                                ctx.command().qualified_name,
                                ctx.author().name
                            );
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let config = config.clone();
            let auth = auth.clone();
            let waiter = waiter.clone();
            let roles = roles.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let platform: Arc<dyn ChatPlatform> =
                    Arc::new(DiscordPlatform::new(ctx.http.clone()));
                let sessions = create_shared_session_coordinator(
                    platform.clone(),
                    auth.clone(),
                    roles.clone(),
                    waiter.clone(),
                    config.clone(),
                );

                Ok(Data {
                    config,
                    platform,
                    waiter,
                    roles,
                    sessions,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_INVITES
        | serenity::GatewayIntents::DIRECT_MESSAGES;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    client.start().await?;
    warn!("Bot ended.");

    Ok(())
}
