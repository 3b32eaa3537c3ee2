use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::channel::{ChannelState, MessageState};
use super::member::MemberState;
use super::permissions::{Permissions, compute_member_permissions};
use crate::config::CacheConfig;
use crate::model::{Channel, Guild, GuildSnapshot, Member, Message, Presence, Role, VoiceState};

/// The live state of one guild, guarded by a single lock.
///
/// Every public method here acquires the lock for exactly one operation.
/// Callers that need several operations to be atomic take a guard with
/// [`GuildState::write`] or [`GuildState::read`] and call the lock-free
/// methods on [`GuildData`] directly.
#[derive(Debug)]
pub struct GuildState {
    id: String,
    inner: RwLock<GuildData>,
}

/// Everything cached for a guild. Only reachable through a [`GuildState`]
/// guard, so holding a `&mut GuildData` proves the write lock is held.
#[derive(Debug)]
pub struct GuildData {
    /// Guild metadata: roles, emojis and voice states live here.
    pub guild: Guild,
    /// Keyed by user ID.
    pub members: HashMap<String, MemberState>,
    /// Keyed by channel ID.
    pub channels: HashMap<String, ChannelState>,
    config: CacheConfig,
}

/// Counts reported for a cached guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildSummary {
    pub id: String,
    pub name: String,
    pub members: usize,
    pub channels: usize,
    pub messages: usize,
    pub roles: usize,
    pub voice_states: usize,
}

impl GuildState {
    /// Build a guild from its initial snapshot, replaying the embedded
    /// channel, member and presence lists into the keyed collections.
    pub fn new(snapshot: GuildSnapshot, config: CacheConfig) -> Self {
        let data = GuildData::new(snapshot, config);
        Self {
            id: data.guild.id.clone(),
            inner: RwLock::new(data),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Acquire the shared lock. A poisoned lock is recovered: the cache is
    /// rebuilt from the event stream, so a half-applied event is tolerable.
    pub fn read(&self) -> RwLockReadGuard<'_, GuildData> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the exclusive lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, GuildData> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Inbound ─────────────────────────────────────────────────────

    pub fn guild_update(&self, update: GuildSnapshot) {
        self.write().guild_update(update);
    }

    pub fn member_add_update(&self, member: Member) {
        self.write().member_add_update(member);
    }

    pub fn member_remove(&self, user_id: &str) {
        self.write().member_remove(user_id);
    }

    pub fn presence_add_update(&self, presence: Presence) {
        self.write().presence_add_update(presence);
    }

    /// Returns true if the channel was newly created.
    pub fn channel_add_update(&self, channel: Channel) -> bool {
        let mut data = self.write();
        let is_new = !data.channels.contains_key(&channel.id);
        data.channel_add_update(channel);
        is_new
    }

    pub fn channel_remove(&self, channel_id: &str) {
        self.write().channel_remove(channel_id);
    }

    pub fn role_add_update(&self, role: Role) {
        self.write().role_add_update(role);
    }

    pub fn role_remove(&self, role_id: &str) {
        self.write().role_remove(role_id);
    }

    pub fn voice_state_update(&self, update: VoiceState) {
        self.write().voice_state_update(update);
    }

    /// Returns false if the message's channel isn't cached and the message
    /// was dropped.
    pub fn message_add_update(&self, message: Message) -> bool {
        self.write().message_add_update(message)
    }

    pub fn message_remove(&self, channel_id: &str, message_id: &str) {
        self.write().message_remove(channel_id, message_id);
    }

    /// Remove several messages from one channel under a single lock.
    pub fn message_remove_bulk(&self, channel_id: &str, message_ids: &[String]) {
        let mut data = self.write();
        for message_id in message_ids {
            data.message_remove(channel_id, message_id);
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    pub fn guild(&self) -> Guild {
        self.read().guild.clone()
    }

    pub fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.read().channel(channel_id).map(|c| c.channel.clone())
    }

    pub fn role(&self, role_id: &str) -> Option<Role> {
        self.read().role(role_id).cloned()
    }

    pub fn voice_state(&self, user_id: &str) -> Option<VoiceState> {
        self.read().voice_state(user_id).cloned()
    }

    pub fn member(&self, user_id: &str) -> Option<MemberState> {
        self.read().members.get(user_id).cloned()
    }

    pub fn message(&self, channel_id: &str, message_id: &str) -> Option<MessageState> {
        self.read().message(channel_id, message_id).cloned()
    }

    /// Cached messages of a channel, oldest first, tombstones included.
    pub fn messages(&self, channel_id: &str) -> Vec<MessageState> {
        self.read()
            .channel(channel_id)
            .map(|c| c.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn members(&self) -> Vec<Member> {
        self.read().members()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.read().channels()
    }

    pub fn member_permissions(
        &self,
        user_id: &str,
        channel_id: Option<&str>,
    ) -> Option<Permissions> {
        self.read().member_permissions(user_id, channel_id)
    }

    pub fn summary(&self) -> GuildSummary {
        self.read().summary()
    }
}

impl GuildData {
    /// Build the data without any locking; it isn't shared yet.
    fn new(snapshot: GuildSnapshot, config: CacheConfig) -> Self {
        let (guild, lists) = snapshot.into_guild(None);
        let mut data = Self {
            guild,
            members: HashMap::new(),
            channels: HashMap::new(),
            config,
        };

        for channel in lists.channels.unwrap_or_default() {
            data.channel_add_update(channel);
        }
        for member in lists.members.unwrap_or_default() {
            data.member_add_update(member);
        }
        for presence in lists.presences.unwrap_or_default() {
            data.presence_add_update(presence);
        }

        data
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Replace the guild metadata. Roles, emojis and voice states the update
    /// omits are carried over. Members, presences and channels are owned by
    /// the keyed collections and are left untouched.
    pub fn guild_update(&mut self, update: GuildSnapshot) {
        let previous = std::mem::take(&mut self.guild);
        let (guild, lists) = update.into_guild(Some(previous));
        if lists.members.is_some() || lists.presences.is_some() || lists.channels.is_some() {
            debug!(
                guild_id = %guild.id,
                "ignoring member/presence/channel lists on guild update"
            );
        }
        self.guild = guild;
    }

    pub fn member_add_update(&mut self, member: Member) {
        match self.members.get_mut(&member.user.id) {
            Some(existing) => existing.apply_member(member),
            None => {
                self.members
                    .insert(member.user.id.clone(), MemberState::from_member(member));
            }
        }
    }

    /// Drop the user's entry, presence included.
    pub fn member_remove(&mut self, user_id: &str) {
        self.members.remove(user_id);
    }

    pub fn presence_add_update(&mut self, presence: Presence) {
        match self.members.get_mut(&presence.user.id) {
            Some(existing) => existing.apply_presence(presence),
            None => {
                self.members
                    .insert(presence.user.id.clone(), MemberState::from_presence(presence));
            }
        }
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ChannelState> {
        self.channels.get(channel_id)
    }

    pub fn channel_mut(&mut self, channel_id: &str) -> Option<&mut ChannelState> {
        self.channels.get_mut(channel_id)
    }

    /// Create or patch a channel. An existing entry is patched in place so
    /// its cached messages survive.
    pub fn channel_add_update(&mut self, channel: Channel) -> &mut ChannelState {
        let guild_id = &self.guild.id;
        match self.channels.entry(channel.id.clone()) {
            Entry::Occupied(entry) => {
                let existing = entry.into_mut();
                existing.patch(channel);
                existing
            }
            Entry::Vacant(entry) => {
                entry.insert(ChannelState::new(channel, guild_id.clone()))
            }
        }
    }

    /// Drop a channel and its cached messages.
    pub fn channel_remove(&mut self, channel_id: &str) {
        self.channels.remove(channel_id);
    }

    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.guild.roles.iter().find(|r| r.id == role_id)
    }

    pub fn role_add_update(&mut self, role: Role) {
        match self.guild.roles.iter_mut().find(|r| r.id == role.id) {
            Some(existing) => *existing = role,
            None => self.guild.roles.push(role),
        }
    }

    pub fn role_remove(&mut self, role_id: &str) {
        if let Some(idx) = self.guild.roles.iter().position(|r| r.id == role_id) {
            self.guild.roles.remove(idx);
        }
    }

    pub fn voice_state(&self, user_id: &str) -> Option<&VoiceState> {
        self.guild.voice_states.iter().find(|v| v.user_id == user_id)
    }

    /// Track a voice move. An empty channel ID means the user left voice
    /// and their entry is removed; nothing else in the update is applied.
    pub fn voice_state_update(&mut self, update: VoiceState) {
        let states = &mut self.guild.voice_states;

        if update.has_left() {
            if let Some(idx) = states.iter().position(|v| v.user_id == update.user_id) {
                states.remove(idx);
            }
            return;
        }

        match states.iter_mut().find(|v| v.user_id == update.user_id) {
            Some(existing) => *existing = update,
            None => states.push(update),
        }
    }

    pub fn message(&self, channel_id: &str, message_id: &str) -> Option<&MessageState> {
        self.channel(channel_id)?.message(message_id)
    }

    /// Cache a new message or patch a cached one. Returns false, dropping
    /// the message, if its channel isn't cached.
    pub fn message_add_update(&mut self, message: Message) -> bool {
        self.message_add_update_at(message, Utc::now())
    }

    pub(crate) fn message_add_update_at(
        &mut self,
        message: Message,
        now: DateTime<Utc>,
    ) -> bool {
        let config = self.config;
        let Some(channel) = self.channels.get_mut(&message.channel_id) else {
            return false;
        };
        channel.add_update_message(message, &config, now);
        true
    }

    /// Remove or tombstone a cached message, per `remove_deleted_messages`.
    pub fn message_remove(&mut self, channel_id: &str, message_id: &str) {
        let hard_delete = self.config.remove_deleted_messages;
        if let Some(channel) = self.channel_mut(channel_id) {
            channel.remove_message(message_id, hard_delete);
        }
    }

    /// Members with cached membership data. Presence-only entries are skipped.
    pub fn members(&self) -> Vec<Member> {
        self.members
            .values()
            .filter_map(|m| m.member.clone())
            .collect()
    }

    pub fn presences(&self) -> Vec<Presence> {
        self.members
            .values()
            .filter_map(|m| m.presence.clone())
            .collect()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.values().map(|c| c.channel.clone()).collect()
    }

    /// Effective permissions of a cached member, within a channel if one is
    /// given and cached. `None` if the user has no membership data.
    pub fn member_permissions(
        &self,
        user_id: &str,
        channel_id: Option<&str>,
    ) -> Option<Permissions> {
        let member = self.members.get(user_id)?.member.as_ref()?;
        let overwrites = channel_id
            .and_then(|id| self.channel(id))
            .map(|c| c.channel.overwrites())
            .unwrap_or(&[]);
        Some(compute_member_permissions(&self.guild, member, overwrites))
    }

    pub fn summary(&self) -> GuildSummary {
        GuildSummary {
            id: self.guild.id.clone(),
            name: self.guild.name.clone(),
            members: self.members.len(),
            channels: self.channels.len(),
            messages: self.channels.values().map(|c| c.messages.len()).sum(),
            roles: self.guild.roles.len(),
            voice_states: self.guild.voice_states.len(),
        }
    }
}
