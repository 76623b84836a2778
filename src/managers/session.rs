use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::auth::{Authenticator, StudentType};
use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::events::interaction::session_button_id;
use crate::events::waiter::{GatewayEvent, SharedEventWaiter};
use crate::managers::invites;
use crate::managers::role_manager::SharedRoleManager;
use crate::messages;
use crate::platform::{ChatPlatform, InteractionHandle, MessageButton, OutboundMessage};

/// How long each of the two waiting phases lasts. A member gets one phase,
/// a warning, then one more phase before the session gives up on them.
pub const PHASE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Drives a member's end-to-end verification: instructions out, wait for a
/// response under the two-stage timeout, re-validate with the identity
/// service, then grant the verified role or remove the member.
pub struct SessionCoordinator {
    platform: Arc<dyn ChatPlatform>,
    auth: Arc<dyn Authenticator>,
    roles: SharedRoleManager,
    waiter: SharedEventWaiter,
    config: Arc<BotConfig>,
    active: DashMap<(GuildId, UserId), ()>,
}

enum FailureReason {
    Timeout,
    InvalidClaim { observed: String },
}

impl FailureReason {
    fn invite_label(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "verification timeout",
            FailureReason::InvalidClaim { .. } => "invalid verification claim",
        }
    }

    fn kick_reason(&self) -> String {
        match self {
            FailureReason::Timeout => {
                "Timed out without verification, took too long to verify".to_string()
            }
            FailureReason::InvalidClaim { observed } if observed.is_empty() => {
                "Was not authenticated but claimed to be".to_string()
            }
            FailureReason::InvalidClaim { observed } => {
                format!("Was not authenticated for this server - observed code: '{}'", observed)
            }
        }
    }

    fn summary(&self) -> String {
        match self {
            FailureReason::Timeout => "timed out waiting for a response, kicked".to_string(),
            FailureReason::InvalidClaim { .. } => {
                "invalid claim of authentication, kicked".to_string()
            }
        }
    }
}

/// Releases the (guild, user) slot when the session resolves by any path.
struct SessionGuard<'a> {
    active: &'a DashMap<(GuildId, UserId), ()>,
    key: (GuildId, UserId),
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

/// Wait for the subscription to yield an event, or for the deadline.
async fn wait_until(
    rx: &mut Option<oneshot::Receiver<GatewayEvent>>,
    deadline: Instant,
) -> Option<GatewayEvent> {
    loop {
        let outcome = match rx.as_mut() {
            Some(receiver) => tokio::select! {
                result = receiver => Some(result),
                _ = sleep_until(deadline) => None,
            },
            None => {
                sleep_until(deadline).await;
                None
            }
        };
        match outcome {
            Some(Ok(event)) => {
                *rx = None;
                return Some(event);
            }
            // Subscription gone; nothing can arrive, so run the timer out
            Some(Err(_)) => *rx = None,
            None => return None,
        }
    }
}

impl SessionCoordinator {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        auth: Arc<dyn Authenticator>,
        roles: SharedRoleManager,
        waiter: SharedEventWaiter,
        config: Arc<BotConfig>,
    ) -> Self {
        Self {
            platform,
            auth,
            roles,
            waiter,
            config,
            active: DashMap::new(),
        }
    }

    fn claim(&self, guild: GuildId, user: UserId) -> Result<SessionGuard<'_>> {
        use dashmap::mapref::entry::Entry;
        match self.active.entry((guild, user)) {
            Entry::Occupied(_) => Err(BotError::VerificationInProgress { user, guild }),
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(SessionGuard {
                    active: &self.active,
                    key: (guild, user),
                })
            }
        }
    }

    /// Run one member's verification session to a terminal outcome.
    /// Callers must not pass bot accounts; those are outside verification.
    pub async fn verify_member(&self, user: UserId, username: &str, guild: GuildId) -> Result<()> {
        let _guard = self.claim(guild, user)?;
        let student_type = self.config.student_type(guild);
        info!(
            "Starting verification for {} in guild {} (expecting {})",
            username, guild, student_type
        );

        let dm = self.platform.open_dm(user).await?;
        let auth_link = self.auth.generate_auth_link(user).await?;

        // Subscribe before sending anything: a response landing between the
        // instructions and the wait must not be lost
        let button_id = session_button_id(guild);
        let (rx, _wait) = self.waiter.subscribe({
            let button_id = button_id.clone();
            move |event| match event {
                GatewayEvent::DirectMessage { author, channel } => {
                    *author == user && *channel == dm
                }
                GatewayEvent::ButtonPress {
                    user: presser,
                    channel,
                    custom_id,
                    ..
                } => *presser == user && *channel == dm && *custom_id == button_id,
            }
        });

        self.platform
            .send_message(
                dm,
                OutboundMessage::text(messages::verification_instructions(
                    username,
                    &auth_link,
                    &self.config.data_policy_url,
                )),
            )
            .await?;
        self.platform
            .send_message(
                dm,
                OutboundMessage::text(messages::verification_button_prompt()).with_button(
                    MessageButton::Action {
                        custom_id: button_id,
                        label: "I've verified".to_string(),
                        emoji: None,
                    },
                ),
            )
            .await?;

        let mut rx = Some(rx);

        let signal = match wait_until(&mut rx, Instant::now() + PHASE_DURATION).await {
            Some(event) => Some(event),
            None => {
                // Timer edge: one authoritative re-check before escalating,
                // in case the member signed in without telling us
                let result = self.auth.check_authenticated(user, student_type).await?;
                if result.authenticated {
                    return self.finish_verified(guild, user, dm, None).await;
                }
                self.platform
                    .send_message(dm, OutboundMessage::text(messages::five_minute_warning()))
                    .await?;
                wait_until(&mut rx, Instant::now() + PHASE_DURATION).await
            }
        };

        match signal {
            Some(event) => {
                let interaction = match event {
                    GatewayEvent::ButtonPress { interaction, .. } => Some(interaction),
                    GatewayEvent::DirectMessage { .. } => None,
                };
                // The signal itself proves nothing; only the identity
                // service's answer does
                let result = self.auth.check_authenticated(user, student_type).await?;
                if result.authenticated {
                    self.finish_verified(guild, user, dm, interaction).await
                } else {
                    self.fail(
                        guild,
                        user,
                        username,
                        dm,
                        student_type,
                        FailureReason::InvalidClaim {
                            observed: result.member_code,
                        },
                    )
                    .await
                }
            }
            None => self.timed_out(guild, user, username, dm, student_type).await,
        }
    }

    async fn finish_verified(
        &self,
        guild: GuildId,
        user: UserId,
        dm: ChannelId,
        interaction: Option<InteractionHandle>,
    ) -> Result<()> {
        let verified_role = self
            .roles
            .resolve_verified_role(self.platform.as_ref(), guild)
            .await?;
        // Granting a role the member already holds is a silent no-op
        self.platform
            .add_role(guild, user, verified_role, "Completed student verification")
            .await?;

        let success = OutboundMessage::text(messages::verification_success());
        match interaction {
            Some(handle) => {
                self.platform
                    .edit_interaction_message(&handle, success)
                    .await?
            }
            None => self.platform.send_message(dm, success).await?,
        }
        info!("User {} verified in guild {}", user, guild);
        Ok(())
    }

    async fn timed_out(
        &self,
        guild: GuildId,
        user: UserId,
        username: &str,
        dm: ChannelId,
        student_type: StudentType,
    ) -> Result<()> {
        // They may have been verified manually while we waited
        let verified_role = self
            .roles
            .resolve_verified_role(self.platform.as_ref(), guild)
            .await?;
        let current = self.platform.member_roles(guild, user).await?;
        if current.contains(&verified_role) {
            info!("{} was verified out-of-band during the wait, leaving them be", username);
            self.platform
                .send_message(dm, OutboundMessage::text(messages::already_verified_exit()))
                .await?;
            return Ok(());
        }
        self.fail(guild, user, username, dm, student_type, FailureReason::Timeout)
            .await
    }

    /// Shared tail for timeouts and invalid claims: farewell with a
    /// single-use re-invite, then the kick. Side-effect failures here are
    /// logged and folded into the summary error, never retried.
    async fn fail(
        &self,
        guild: GuildId,
        user: UserId,
        username: &str,
        dm: ChannelId,
        student_type: StudentType,
        reason: FailureReason,
    ) -> Result<()> {
        let invite = match invites::create_reinvite(
            self.platform.as_ref(),
            guild,
            username,
            reason.invite_label(),
        )
        .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Failed creating a re-invite for {}: {}", username, e);
                None
            }
        };

        let body = match &reason {
            FailureReason::Timeout => messages::timeout_farewell(),
            FailureReason::InvalidClaim { observed } if observed.is_empty() => {
                messages::invalid_claim_farewell()
            }
            FailureReason::InvalidClaim { observed } => {
                let guild_name = match self.platform.guild_name(guild).await {
                    Ok(name) => name,
                    Err(e) => {
                        warn!("Failed fetching the name of guild {}: {}", guild, e);
                        guild.to_string()
                    }
                };
                messages::wrong_student_type_farewell(&guild_name, observed, student_type)
            }
        };

        let mut farewell = OutboundMessage::text(body);
        if let Some(url) = invite {
            farewell = farewell.with_button(MessageButton::Link {
                url,
                label: "Rejoin the server".to_string(),
            });
        }
        if let Err(e) = self.platform.send_message(dm, farewell).await {
            warn!("Failed sending the farewell to {}: {}", username, e);
        }
        if let Err(e) = self.platform.kick(guild, user, &reason.kick_reason()).await {
            warn!("Failed kicking {} from guild {}: {}", username, guild, e);
        }

        Err(BotError::VerificationFailed {
            username: username.to_string(),
            reason: reason.summary(),
        })
    }
}

/// Shared session coordinator type
pub type SharedSessionCoordinator = Arc<SessionCoordinator>;

pub fn create_shared_session_coordinator(
    platform: Arc<dyn ChatPlatform>,
    auth: Arc<dyn Authenticator>,
    roles: SharedRoleManager,
    waiter: SharedEventWaiter,
    config: Arc<BotConfig>,
) -> SharedSessionCoordinator {
    Arc::new(SessionCoordinator::new(platform, auth, roles, waiter, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuildConfig;
    use crate::events::waiter::create_shared_event_waiter;
    use crate::managers::role_manager::create_shared_role_manager;
    use crate::platform::mock::{dm_channel_for, MockAuthenticator, MockPlatform, MockState};
    use crate::platform::{ChannelSummary, RoleInfo};
    use poise::serenity_prelude::RoleId;

    const GUILD: GuildId = GuildId::new(900);
    const USER: UserId = UserId::new(10);
    const VERIFIED_ROLE: RoleId = RoleId::new(42);

    fn verified_role() -> RoleInfo {
        RoleInfo {
            id: VERIFIED_ROLE,
            name: "Verified".to_string(),
        }
    }

    fn landing_channel() -> ChannelSummary {
        ChannelSummary {
            id: ChannelId::new(1),
            name: "welcome".to_string(),
            position: 0,
        }
    }

    fn test_config(alumni: bool) -> Arc<BotConfig> {
        let mut config = BotConfig::default();
        config.guilds.insert(
            GUILD.to_string(),
            GuildConfig {
                alumni_guild: alumni,
                ..GuildConfig::default()
            },
        );
        Arc::new(config)
    }

    struct Harness {
        platform: Arc<MockPlatform>,
        auth: Arc<MockAuthenticator>,
        waiter: SharedEventWaiter,
        coordinator: SharedSessionCoordinator,
    }

    fn harness(alumni: bool, setup: impl FnOnce(&mut MockState)) -> Harness {
        let platform = Arc::new(MockPlatform::with_state(setup));
        let auth = Arc::new(MockAuthenticator::new());
        let waiter = create_shared_event_waiter();
        let coordinator = create_shared_session_coordinator(
            platform.clone(),
            auth.clone(),
            create_shared_role_manager(),
            waiter.clone(),
            test_config(alumni),
        );
        Harness {
            platform,
            auth,
            waiter,
            coordinator,
        }
    }

    fn spawn_session(h: &Harness) -> tokio::task::JoinHandle<Result<()>> {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.verify_member(USER, "alice", GUILD).await })
    }

    async fn deliver(h: &Harness, event: GatewayEvent) {
        // The session subscribes after a few awaits; keep offering until it does
        while !h.waiter.notify(&event) {
            tokio::task::yield_now().await;
        }
    }

    fn button_press() -> GatewayEvent {
        GatewayEvent::ButtonPress {
            user: USER,
            channel: dm_channel_for(USER),
            custom_id: session_button_id(GUILD),
            interaction: InteractionHandle {
                token: "token-1".to_string(),
            },
        }
    }

    fn direct_message() -> GatewayEvent {
        GatewayEvent::DirectMessage {
            author: USER,
            channel: dm_channel_for(USER),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticated_button_press_grants_role_and_never_kicks() {
        let h = harness(false, |state| {
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
        });
        h.auth.set_code(USER, "UG");

        let session = spawn_session(&h);
        deliver(&h, button_press()).await;
        session.await.unwrap().unwrap();

        let state = h.platform.state.lock().unwrap();
        assert!(state.kicks.is_empty());
        assert_eq!(state.member_roles[&USER], vec![VERIFIED_ROLE], "role granted exactly once");
        // Success shown by editing the button's original message in place
        assert_eq!(state.interaction_edits.len(), 1);
        assert!(state.interaction_edits[0].1.content.contains("verified"));
        assert!(state.interaction_edits[0].1.buttons.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_unauthenticated_member_is_warned_then_kicked_once() {
        let h = harness(false, |state| {
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
        });

        let err = spawn_session(&h).await.unwrap().unwrap_err();
        assert!(matches!(err, BotError::VerificationFailed { .. }));

        let sent = h.platform.messages_to(dm_channel_for(USER));
        assert_eq!(sent.len(), 4, "instructions, button prompt, warning, farewell");
        assert!(sent[2].content.contains("five minutes"));
        let farewell = &sent[3];
        assert!(matches!(
            farewell.buttons.as_slice(),
            [MessageButton::Link { url, .. }] if url.starts_with("https://discord.gg/")
        ));

        let state = h.platform.state.lock().unwrap();
        assert_eq!(state.kicks.len(), 1, "kicked exactly once");
        assert!(state.kicks[0].1.contains("Timed out"));
        assert_eq!(state.invites.len(), 1, "a single-use invite was minted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_band_verification_during_wait_exits_without_kick() {
        let h = harness(false, |state| {
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
            // Granted manually by an admin while the session waits
            state.member_roles.insert(USER, vec![VERIFIED_ROLE]);
        });

        spawn_session(&h).await.unwrap().unwrap();

        let state = h.platform.state.lock().unwrap();
        assert!(state.kicks.is_empty());
        assert!(state.invites.is_empty());
        drop(state);
        let sent = h.platform.messages_to(dm_channel_for(USER));
        assert!(sent.last().unwrap().content.contains("already been verified"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_a_timer_recheck_short_circuits_to_success() {
        let h = harness(false, |state| {
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
        });
        // Signed in without ever touching the button or replying
        h.auth.set_code(USER, "PGR");

        spawn_session(&h).await.unwrap().unwrap();

        let state = h.platform.state.lock().unwrap();
        assert!(state.kicks.is_empty());
        assert_eq!(state.member_roles[&USER], vec![VERIFIED_ROLE]);
        drop(state);
        let sent = h.platform.messages_to(dm_channel_for(USER));
        assert_eq!(sent.len(), 3, "instructions, button prompt, success - no warning");
        assert!(sent[2].content.contains("now verified"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_student_type_gets_mismatch_copy_and_is_kicked() {
        let h = harness(true, |state| {
            state.guild_name = "Alumni Hangout".to_string();
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
        });
        // A real current student, but this guild only accepts alumni
        h.auth.set_code(USER, "PGT");

        let session = spawn_session(&h);
        deliver(&h, direct_message()).await;
        let err = session.await.unwrap().unwrap_err();
        assert!(matches!(err, BotError::VerificationFailed { .. }));

        let sent = h.platform.messages_to(dm_channel_for(USER));
        let farewell = sent.last().unwrap();
        assert!(farewell.content.contains("alumni"), "mismatch copy names the requirement");
        assert!(farewell.content.contains("Alumni Hangout"));

        let state = h.platform.state.lock().unwrap();
        assert_eq!(state.kicks.len(), 1);
        assert!(state.kicks[0].1.contains("PGT"), "audit reason carries the observed code");
        assert!(state.interaction_edits.is_empty(), "resolved via DM, not a button");
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_claim_gets_generic_copy() {
        let h = harness(false, |state| {
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
        });
        // No code at all: the identity service denies them outright

        let session = spawn_session(&h);
        deliver(&h, button_press()).await;
        let err = session.await.unwrap().unwrap_err();
        assert!(matches!(err, BotError::VerificationFailed { .. }));

        let sent = h.platform.messages_to(dm_channel_for(USER));
        assert!(sent
            .last()
            .unwrap()
            .content
            .contains("doesn't look like you authenticated"));
        let state = h.platform.state.lock().unwrap();
        assert_eq!(state.kicks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_trigger_rejected_while_session_active() {
        let h = harness(false, |state| {
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
        });

        let session = spawn_session(&h);
        // Wait for the first session to get under way
        while h.platform.state.lock().unwrap().sent.is_empty() {
            tokio::task::yield_now().await;
        }

        let err = h.coordinator.verify_member(USER, "alice", GUILD).await.unwrap_err();
        assert!(matches!(err, BotError::VerificationInProgress { .. }));

        // The first session is unaffected and still runs to its own outcome
        let err = session.await.unwrap().unwrap_err();
        assert!(matches!(err, BotError::VerificationFailed { .. }));

        // And the slot is free again afterwards
        let err = h.coordinator.verify_member(USER, "alice", GUILD).await.unwrap_err();
        assert!(matches!(err, BotError::VerificationFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_aborts_without_side_effects() {
        let h = harness(false, |state| {
            state.roles.push(verified_role());
            state.channels.push(landing_channel());
            state.fail_open_dm = true;
        });

        let err = spawn_session(&h).await.unwrap().unwrap_err();
        assert!(matches!(err, BotError::Discord { .. }));

        let state = h.platform.state.lock().unwrap();
        assert!(state.sent.is_empty());
        assert!(state.kicks.is_empty());
    }
}
