use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::config::CacheConfig;
use crate::model::{Channel, Message, parse_timestamp};

/// A cached message plus its pre-parsed timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageState {
    pub message: Message,
    /// Parsed `timestamp`; `None` when missing or malformed.
    pub created_at: Option<DateTime<Utc>>,
    /// Parsed `edited_timestamp`.
    pub edited_at: Option<DateTime<Utc>>,
    /// Set instead of dropping the entry when deletes are soft.
    pub deleted: bool,
}

impl MessageState {
    pub fn new(message: Message) -> Self {
        let mut state = Self {
            message,
            created_at: None,
            edited_at: None,
            deleted: false,
        };
        state.parse_times();
        state
    }

    pub fn id(&self) -> &str {
        &self.message.id
    }

    fn parse_times(&mut self) {
        self.created_at = parse_timestamp(&self.message.timestamp);
        self.edited_at = parse_timestamp(&self.message.edited_timestamp);
    }

    /// Copy over only the fields the update actually carries.
    fn patch(&mut self, update: Message) {
        let existing = &mut self.message;
        if !update.content.is_empty() {
            existing.content = update.content;
        }
        if !update.edited_timestamp.is_empty() {
            existing.edited_timestamp = update.edited_timestamp;
        }
        if update.mentions.is_some() {
            existing.mentions = update.mentions;
        }
        if update.embeds.is_some() {
            existing.embeds = update.embeds;
        }
        if update.attachments.is_some() {
            existing.attachments = update.attachments;
        }
        if !update.timestamp.is_empty() {
            existing.timestamp = update.timestamp;
        }
        if update.author.is_some() {
            existing.author = update.author;
        }
        self.parse_times();
    }

    fn is_older_than(&self, max_age: TimeDelta, now: DateTime<Utc>) -> bool {
        self.created_at
            .is_some_and(|created| now.signed_duration_since(created) > max_age)
    }
}

/// One cached channel and its bounded message history.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub channel: Channel,
    /// ID of the owning guild. Association only: the entry lives inside the
    /// guild's lock and never keeps the guild alive.
    pub guild_id: String,
    /// Cached messages, oldest first.
    pub messages: VecDeque<MessageState>,
}

impl ChannelState {
    pub fn new(channel: Channel, guild_id: String) -> Self {
        Self {
            channel,
            guild_id,
            messages: VecDeque::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.channel.id
    }

    pub fn message(&self, message_id: &str) -> Option<&MessageState> {
        self.messages.iter().find(|m| m.id() == message_id)
    }

    fn message_mut(&mut self, message_id: &str) -> Option<&mut MessageState> {
        self.messages.iter_mut().find(|m| m.id() == message_id)
    }

    /// Replace the channel metadata, keeping the stored permission
    /// overwrites and DM recipient when the update omits them.
    pub(crate) fn patch(&mut self, mut update: Channel) {
        if update.permission_overwrites.is_none() {
            update.permission_overwrites = self.channel.permission_overwrites.take();
        }
        if update.kind.is_private() && update.recipient.is_none() {
            update.recipient = self.channel.recipient.take();
        }
        self.channel = update;
    }

    /// Insert or patch a message, then enforce the count and age caps.
    pub(crate) fn add_update_message(
        &mut self,
        message: Message,
        config: &CacheConfig,
        now: DateTime<Utc>,
    ) {
        if let Some(existing) = self.message_mut(&message.id) {
            existing.patch(message);
        } else {
            self.messages.push_back(MessageState::new(message));
            self.evict_overflow(config.max_messages);
        }

        if let Some(max_age) = config.max_message_age() {
            self.evict_expired(max_age, now);
        }
    }

    /// Drop the oldest messages until at most `max` remain.
    fn evict_overflow(&mut self, max: usize) {
        let excess = self.messages.len().saturating_sub(max);
        if excess > 0 {
            self.messages.drain(..excess);
        }
    }

    /// Scan newest to oldest for the first message past `max_age` and drop it
    /// together with everything older. Messages without a parseable
    /// timestamp are skipped, never treated as expired.
    fn evict_expired(&mut self, max_age: TimeDelta, now: DateTime<Utc>) {
        let Some(idx) = self
            .messages
            .iter()
            .rposition(|m| m.is_older_than(max_age, now))
        else {
            return;
        };

        self.messages.drain(..=idx);
        debug!(
            channel_id = %self.channel.id,
            evicted = idx + 1,
            "evicted expired messages"
        );
    }

    /// Remove or tombstone a message. Returns false if it isn't cached.
    pub(crate) fn remove_message(&mut self, message_id: &str, hard_delete: bool) -> bool {
        let Some(idx) = self.messages.iter().position(|m| m.id() == message_id) else {
            return false;
        };

        if hard_delete {
            self.messages.remove(idx);
        } else {
            self.messages[idx].deleted = true;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelType, OverwriteKind, PermissionOverwrite, User};

    fn config(max_messages: usize, max_message_age_secs: u64) -> CacheConfig {
        CacheConfig {
            max_messages,
            max_message_age_secs,
            remove_deleted_messages: false,
        }
    }

    fn msg(id: &str, timestamp: &str) -> Message {
        Message {
            id: id.into(),
            channel_id: "c1".into(),
            content: format!("content {id}"),
            timestamp: timestamp.into(),
            ..Default::default()
        }
    }

    fn channel_state() -> ChannelState {
        ChannelState::new(
            Channel {
                id: "c1".into(),
                guild_id: "g1".into(),
                name: "general".into(),
                ..Default::default()
            },
            "g1".into(),
        )
    }

    fn ids(state: &ChannelState) -> Vec<&str> {
        state.messages.iter().map(|m| m.id()).collect()
    }

    fn ago(now: DateTime<Utc>, secs: i64) -> String {
        (now - TimeDelta::seconds(secs)).to_rfc3339()
    }

    #[test]
    fn test_count_cap_keeps_newest() {
        let mut state = channel_state();
        let cfg = config(3, 0);
        let now = Utc::now();
        for i in 1..=5 {
            state.add_update_message(msg(&format!("m{i}"), ""), &cfg, now);
            assert!(state.messages.len() <= 3);
        }
        assert_eq!(ids(&state), ["m3", "m4", "m5"]);
    }

    #[test]
    fn test_zero_cap_keeps_nothing() {
        let mut state = channel_state();
        state.add_update_message(msg("m1", ""), &config(0, 0), Utc::now());
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_update_patches_only_present_fields() {
        let mut state = channel_state();
        let cfg = config(10, 0);
        let now = Utc::now();
        let mut original = msg("m1", "2024-01-01T00:00:00Z");
        original.author = Some(User {
            id: "u1".into(),
            ..Default::default()
        });
        original.mentions = Some(vec![]);
        state.add_update_message(original, &cfg, now);

        let update = Message {
            id: "m1".into(),
            channel_id: "c1".into(),
            content: "edited".into(),
            edited_timestamp: "2024-01-01T00:05:00Z".into(),
            ..Default::default()
        };
        state.add_update_message(update, &cfg, now);

        assert_eq!(state.messages.len(), 1);
        let m = state.message("m1").unwrap();
        assert_eq!(m.message.content, "edited");
        assert_eq!(m.message.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(m.message.author.as_ref().unwrap().id, "u1");
        assert_eq!(m.message.mentions, Some(vec![]));
        assert!(m.created_at.is_some());
        assert_eq!(
            m.edited_at,
            parse_timestamp("2024-01-01T00:05:00Z"),
            "edited time is re-derived after a patch"
        );
    }

    #[test]
    fn test_update_does_not_trigger_count_eviction() {
        let mut state = channel_state();
        let cfg = config(2, 0);
        let now = Utc::now();
        state.add_update_message(msg("m1", ""), &cfg, now);
        state.add_update_message(msg("m2", ""), &cfg, now);
        state.add_update_message(msg("m1", ""), &cfg, now);
        assert_eq!(ids(&state), ["m1", "m2"]);
    }

    #[test]
    fn test_age_eviction_drops_expired_and_older() {
        let mut state = channel_state();
        let now = Utc::now();
        let no_age = config(10, 0);
        state.add_update_message(msg("old1", &ago(now, 7200)), &no_age, now);
        state.add_update_message(msg("old2", &ago(now, 4000)), &no_age, now);
        state.add_update_message(msg("fresh", &ago(now, 60)), &no_age, now);
        assert_eq!(state.messages.len(), 3);

        state.add_update_message(msg("new", &ago(now, 0)), &config(10, 3600), now);
        assert_eq!(ids(&state), ["fresh", "new"]);
    }

    #[test]
    fn test_age_eviction_skips_unparseable_timestamps() {
        let mut state = channel_state();
        let now = Utc::now();
        let cfg = config(10, 3600);
        state.add_update_message(msg("garbled", "not a time"), &cfg, now);
        state.add_update_message(msg("blank", ""), &cfg, now);
        state.add_update_message(msg("new", &ago(now, 10)), &cfg, now);
        assert_eq!(ids(&state), ["garbled", "blank", "new"]);
    }

    #[test]
    fn test_age_eviction_runs_on_update_path() {
        let mut state = channel_state();
        let now = Utc::now();
        state.add_update_message(msg("m1", &ago(now, 10)), &config(10, 0), now);
        state.add_update_message(msg("m2", &ago(now, 10)), &config(10, 0), now);

        let later = now + TimeDelta::hours(2);
        state.add_update_message(msg("m2", ""), &config(10, 3600), later);
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_remove_message_soft_and_hard() {
        let mut state = channel_state();
        let cfg = config(10, 0);
        let now = Utc::now();
        for id in ["m1", "m2", "m3"] {
            state.add_update_message(msg(id, ""), &cfg, now);
        }

        assert!(state.remove_message("m2", false));
        assert_eq!(state.messages.len(), 3);
        assert!(state.message("m2").unwrap().deleted);

        assert!(state.remove_message("m1", true));
        assert_eq!(ids(&state), ["m2", "m3"]);
        assert!(state.message("m1").is_none());

        assert!(!state.remove_message("missing", true));
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn test_patch_carries_overwrites() {
        let mut state = channel_state();
        state.channel.permission_overwrites = Some(vec![PermissionOverwrite {
            id: "r1".into(),
            kind: OverwriteKind::Role,
            allow: 1,
            deny: 0,
        }]);

        state.patch(Channel {
            id: "c1".into(),
            name: "renamed".into(),
            ..Default::default()
        });
        assert_eq!(state.channel.name, "renamed");
        assert_eq!(state.channel.overwrites().len(), 1);

        state.patch(Channel {
            id: "c1".into(),
            permission_overwrites: Some(vec![]),
            ..Default::default()
        });
        assert!(state.channel.overwrites().is_empty());
    }

    #[test]
    fn test_patch_carries_dm_recipient() {
        let recipient = User {
            id: "u2".into(),
            ..Default::default()
        };
        let mut state = ChannelState::new(
            Channel {
                id: "dm".into(),
                kind: ChannelType::Dm,
                recipient: Some(recipient.clone()),
                ..Default::default()
            },
            String::new(),
        );

        state.patch(Channel {
            id: "dm".into(),
            kind: ChannelType::Dm,
            last_message_id: Some("m9".into()),
            ..Default::default()
        });
        assert_eq!(state.channel.recipient, Some(recipient));
        assert_eq!(state.channel.last_message_id.as_deref(), Some("m9"));
    }
}
