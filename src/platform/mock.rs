//! In-memory platform and authenticator doubles backing the session,
//! role-manager and scanner tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};

use crate::auth::{AuthResult, Authenticator, StudentType};
use crate::error::{BotError, Result};
use crate::platform::{
    ChannelSummary, ChatPlatform, InteractionHandle, MemberProfile, OutboundMessage, RoleInfo,
};

/// The DM channel id the mock allocates for a user.
pub fn dm_channel_for(user: UserId) -> ChannelId {
    ChannelId::new(user.get() + 100_000)
}

#[derive(Default)]
pub struct MockState {
    pub sent: Vec<(ChannelId, OutboundMessage)>,
    pub interaction_edits: Vec<(InteractionHandle, OutboundMessage)>,
    pub guild_name: String,
    pub roles: Vec<RoleInfo>,
    pub created_role_names: Vec<String>,
    pub member_roles: HashMap<UserId, Vec<RoleId>>,
    pub members: Vec<MemberProfile>,
    pub channels: Vec<ChannelSummary>,
    pub invites: Vec<(ChannelId, String)>,
    pub kicks: Vec<(UserId, String)>,
    pub fail_open_dm: bool,
    next_role_id: u64,
    next_invite: u64,
}

pub struct MockPlatform {
    pub state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                guild_name: "Test Guild".to_string(),
                next_role_id: 5000,
                ..MockState::default()
            }),
        }
    }

    pub fn with_state(f: impl FnOnce(&mut MockState)) -> Self {
        let mock = Self::new();
        f(&mut mock.state.lock().unwrap());
        mock
    }

    /// Messages sent to a channel, in order
    pub fn messages_to(&self, channel: ChannelId) -> Vec<OutboundMessage> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn open_dm(&self, user: UserId) -> Result<ChannelId> {
        let state = self.state.lock().unwrap();
        if state.fail_open_dm {
            return Err(BotError::Discord {
                message: "cannot open DM".to_string(),
            });
        }
        Ok(dm_channel_for(user))
    }

    async fn send_message(&self, channel: ChannelId, message: OutboundMessage) -> Result<()> {
        self.state.lock().unwrap().sent.push((channel, message));
        Ok(())
    }

    async fn edit_interaction_message(
        &self,
        interaction: &InteractionHandle,
        message: OutboundMessage,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .interaction_edits
            .push((interaction.clone(), message));
        Ok(())
    }

    async fn guild_name(&self, _guild: GuildId) -> Result<String> {
        Ok(self.state.lock().unwrap().guild_name.clone())
    }

    async fn guild_roles(&self, _guild: GuildId) -> Result<Vec<RoleInfo>> {
        Ok(self.state.lock().unwrap().roles.clone())
    }

    async fn create_role(&self, _guild: GuildId, name: &str, _reason: &str) -> Result<RoleInfo> {
        let mut state = self.state.lock().unwrap();
        state.next_role_id += 1;
        let role = RoleInfo {
            id: RoleId::new(state.next_role_id),
            name: name.to_string(),
        };
        state.roles.push(role.clone());
        state.created_role_names.push(name.to_string());
        Ok(role)
    }

    async fn add_role(
        &self,
        _guild: GuildId,
        user: UserId,
        role: RoleId,
        _reason: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let roles = state.member_roles.entry(user).or_default();
        // Granting an already-held role is a no-op, as on Discord
        if !roles.contains(&role) {
            roles.push(role);
        }
        Ok(())
    }

    async fn remove_role(
        &self,
        _guild: GuildId,
        user: UserId,
        role: RoleId,
        _reason: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(roles) = state.member_roles.get_mut(&user) {
            roles.retain(|r| *r != role);
        }
        Ok(())
    }

    async fn member_roles(&self, _guild: GuildId, user: UserId) -> Result<Vec<RoleId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .member_roles
            .get(&user)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_members(&self, _guild: GuildId) -> Result<Vec<MemberProfile>> {
        Ok(self.state.lock().unwrap().members.clone())
    }

    async fn text_channels(&self, _guild: GuildId) -> Result<Vec<ChannelSummary>> {
        Ok(self.state.lock().unwrap().channels.clone())
    }

    async fn create_invite(&self, channel: ChannelId, reason: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_invite += 1;
        let url = format!("https://discord.gg/mock-{}", state.next_invite);
        state.invites.push((channel, reason.to_string()));
        Ok(url)
    }

    async fn kick(&self, _guild: GuildId, user: UserId, reason: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .kicks
            .push((user, reason.to_string()));
        Ok(())
    }
}

/// Authenticator double: a fixed identity code per user, absent means the
/// service denies the member.
#[derive(Default)]
pub struct MockAuthenticator {
    pub codes: Mutex<HashMap<UserId, String>>,
    pub transport_failures: Mutex<HashSet<UserId>>,
}

impl MockAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_code(&self, user: UserId, code: &str) {
        self.codes.lock().unwrap().insert(user, code.to_string());
    }

    pub fn fail_transport_for(&self, user: UserId) {
        self.transport_failures.lock().unwrap().insert(user);
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn generate_auth_link(&self, user: UserId) -> Result<String> {
        Ok(format!("https://auth.example.org/login/{}", user))
    }

    async fn check_authenticated(
        &self,
        user: UserId,
        student_type: StudentType,
    ) -> Result<AuthResult> {
        if self.transport_failures.lock().unwrap().contains(&user) {
            return Err(BotError::AuthService {
                message: format!("connection refused checking user {}", user),
            });
        }
        match self.codes.lock().unwrap().get(&user) {
            Some(code) => Ok(student_type.evaluate(code)),
            None => Ok(AuthResult::denied()),
        }
    }
}
