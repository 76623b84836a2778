use std::future::Future;
use std::sync::Arc;

use poise::serenity_prelude::GuildId;
use tracing::{info, warn};

use crate::auth::{Authenticator, StudentType};
use crate::error::Result;
use crate::events::interaction::VERIFYME_BUTTON_GUILD_PREFIX;
use crate::managers::invites;
use crate::messages;
use crate::platform::{ChatPlatform, MemberProfile, MessageButton, OutboundMessage};

/// Batch job sweeping a guild's full membership for members whose identity
/// no longer satisfies the guild's student type. Runs without sessions,
/// straight over the auth client and role logic.
pub struct InvalidMemberScanner {
    platform: Arc<dyn ChatPlatform>,
    auth: Arc<dyn Authenticator>,
}

impl InvalidMemberScanner {
    pub fn new(platform: Arc<dyn ChatPlatform>, auth: Arc<dyn Authenticator>) -> Self {
        Self { platform, auth }
    }

    /// Check every non-bot member against the identity service and invoke
    /// `on_invalid` with the member and their observed code for each one
    /// that fails. One member's trouble never aborts the rest of the scan.
    pub async fn scan_guild<F, Fut>(
        &self,
        guild: GuildId,
        student_type: StudentType,
        on_invalid: F,
    ) -> Result<()>
    where
        F: Fn(MemberProfile, String) -> Fut,
        Fut: Future<Output = ()>,
    {
        let members = self.platform.list_members(guild).await?;
        for member in members {
            if member.is_bot {
                // don't warn or remove bots!
                continue;
            }
            match self.auth.check_authenticated(member.user_id, student_type).await {
                Ok(result) if !result.authenticated => {
                    on_invalid(member, result.member_code).await;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Skipping {} in guild {}: identity check failed: {}",
                        member.display_name, guild, e
                    );
                }
            }
        }
        Ok(())
    }

    /// Warn every invalid member that they will be removed unless they
    /// verify within `timeframe`. In dry-run mode only the names are logged.
    pub async fn warn_invalid_members(
        &self,
        guild: GuildId,
        student_type: StudentType,
        timeframe: &str,
        dry_run: bool,
    ) -> Result<()> {
        let guild_name = self.platform.guild_name(guild).await?;
        info!("Scanning guild {} ({}) for members to warn", guild, guild_name);

        self.scan_guild(guild, student_type, |member, observed| {
            let platform = Arc::clone(&self.platform);
            let guild_name = guild_name.clone();
            let timeframe = timeframe.to_string();
            async move {
                info!(
                    "Member {} is not correctly authenticated - warning",
                    member.display_name
                );
                if dry_run {
                    return;
                }

                let dm = match platform.open_dm(member.user_id).await {
                    Ok(dm) => dm,
                    Err(e) => {
                        warn!("Failed opening a channel to {}: {}", member.display_name, e);
                        return;
                    }
                };
                let message = OutboundMessage::text(messages::invalid_member_warning(
                    &guild_name,
                    &timeframe,
                    &observed,
                    student_type,
                ))
                .with_button(MessageButton::Action {
                    custom_id: format!("{}{}", VERIFYME_BUTTON_GUILD_PREFIX, guild),
                    label: "Let's get verified!".to_string(),
                    emoji: Some('🎉'),
                });
                if let Err(e) = platform.send_message(dm, message).await {
                    warn!("Failed messaging {}: {}", member.display_name, e);
                }
            }
        })
        .await
    }

    /// Kick every invalid member, then send them a farewell carrying a
    /// fresh single-use re-invite.
    pub async fn purge_invalid_members(
        &self,
        guild: GuildId,
        student_type: StudentType,
    ) -> Result<()> {
        let guild_name = self.platform.guild_name(guild).await?;
        info!("Scanning guild {} ({}) for members to purge", guild, guild_name);

        self.scan_guild(guild, student_type, |member, observed| {
            let platform = Arc::clone(&self.platform);
            let guild_name = guild_name.clone();
            async move {
                info!(
                    "Member {} is not correctly authenticated - purging",
                    member.display_name
                );

                let reason = format!(
                    "Incorrectly authenticated for this server and an invalid member \
                    purge is running - was: '{}'",
                    observed
                );
                if let Err(e) = platform.kick(guild, member.user_id, &reason).await {
                    warn!("Failed kicking {} from guild {}: {}", member.display_name, guild, e);
                    return;
                }

                let dm = match platform.open_dm(member.user_id).await {
                    Ok(dm) => dm,
                    Err(e) => {
                        warn!("Failed opening a channel to {}: {}", member.display_name, e);
                        return;
                    }
                };
                let mut farewell = OutboundMessage::text(messages::purge_farewell(&guild_name));
                match invites::create_reinvite(
                    platform.as_ref(),
                    guild,
                    &member.display_name,
                    "removed during an invalid member purge",
                )
                .await
                {
                    Ok(url) => {
                        farewell = farewell.with_button(MessageButton::Link {
                            url,
                            label: "Rejoin the server".to_string(),
                        });
                    }
                    Err(e) => {
                        warn!("Failed creating a re-invite for {}: {}", member.display_name, e);
                    }
                }
                if let Err(e) = platform.send_message(dm, farewell).await {
                    warn!("Failed messaging {}: {}", member.display_name, e);
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{dm_channel_for, MockAuthenticator, MockPlatform};
    use crate::platform::{ChannelSummary, RoleInfo};
    use poise::serenity_prelude::{ChannelId, RoleId, UserId};
    use std::sync::Mutex;

    const GUILD: GuildId = GuildId::new(900);

    fn member(id: u64, name: &str, is_bot: bool) -> MemberProfile {
        MemberProfile {
            user_id: UserId::new(id),
            display_name: name.to_string(),
            is_bot,
        }
    }

    fn scanner_with(
        members: Vec<MemberProfile>,
    ) -> (Arc<MockPlatform>, Arc<MockAuthenticator>, InvalidMemberScanner) {
        let platform = Arc::new(MockPlatform::with_state(|state| {
            state.members = members;
            state.channels.push(ChannelSummary {
                id: ChannelId::new(1),
                name: "welcome".to_string(),
                position: 0,
            });
            state.roles.push(RoleInfo {
                id: RoleId::new(42),
                name: "Verified".to_string(),
            });
        }));
        let auth = Arc::new(MockAuthenticator::new());
        let scanner = InvalidMemberScanner::new(platform.clone(), auth.clone());
        (platform, auth, scanner)
    }

    #[tokio::test]
    async fn test_scan_skips_bots_and_reports_invalid_members() {
        let (_platform, auth, scanner) = scanner_with(vec![
            member(1, "alice", false),
            member(2, "bob", false),
            member(3, "beep", true),
        ]);
        auth.set_code(UserId::new(1), "UG");
        // bob has no code: denied. beep is a bot: never checked.

        let seen = Mutex::new(Vec::new());
        scanner
            .scan_guild(GUILD, StudentType::CurrentStudent, |member, observed| {
                seen.lock().unwrap().push((member.display_name, observed));
                async {}
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![("bob".to_string(), String::new())]);
    }

    #[tokio::test]
    async fn test_scan_continues_past_transport_failures() {
        let (_platform, auth, scanner) = scanner_with(vec![
            member(1, "alice", false),
            member(2, "bob", false),
        ]);
        auth.fail_transport_for(UserId::new(1));
        // bob has no code and should still be reported

        let seen = Mutex::new(Vec::new());
        scanner
            .scan_guild(GUILD, StudentType::CurrentStudent, |member, _| {
                seen.lock().unwrap().push(member.display_name);
                async {}
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn test_warn_sends_dm_with_verify_button() {
        let (platform, auth, scanner) = scanner_with(vec![member(2, "bob", false)]);
        auth.set_code(UserId::new(2), "Alumni");
        // An alumnus on a current-student guild gets warned

        scanner
            .warn_invalid_members(GUILD, StudentType::CurrentStudent, "a few days", false)
            .await
            .unwrap();

        let sent = platform.messages_to(dm_channel_for(UserId::new(2)));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.contains("an alumnus"));
        assert!(matches!(
            &sent[0].buttons[0],
            MessageButton::Action { custom_id, .. }
                if custom_id == &format!("{}{}", VERIFYME_BUTTON_GUILD_PREFIX, GUILD)
        ));
    }

    #[tokio::test]
    async fn test_warn_dry_run_sends_nothing() {
        let (platform, _auth, scanner) = scanner_with(vec![member(2, "bob", false)]);

        scanner
            .warn_invalid_members(GUILD, StudentType::CurrentStudent, "a few days", true)
            .await
            .unwrap();

        assert!(platform.state.lock().unwrap().sent.is_empty());
    }

    #[tokio::test]
    async fn test_purge_kicks_then_reinvites() {
        let (platform, auth, scanner) = scanner_with(vec![
            member(1, "alice", false),
            member(2, "bob", false),
        ]);
        auth.set_code(UserId::new(1), "PGR");
        auth.set_code(UserId::new(2), "PGT");

        scanner
            .purge_invalid_members(GUILD, StudentType::Alumnus)
            .await
            .unwrap();

        let state = platform.state.lock().unwrap();
        assert_eq!(state.kicks.len(), 2);
        assert!(state.kicks[0].1.contains("PGR"));
        assert!(state.kicks[1].1.contains("PGT"));
        assert_eq!(state.invites.len(), 2);
        drop(state);

        let farewell = platform.messages_to(dm_channel_for(UserId::new(2)));
        assert_eq!(farewell.len(), 1);
        assert!(farewell[0].content.contains("say goodbye"));
        assert!(matches!(&farewell[0].buttons[0], MessageButton::Link { .. }));
    }
}
