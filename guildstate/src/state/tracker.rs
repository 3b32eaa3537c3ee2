use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::events::GuildEvent;
use super::guild::GuildState;
use crate::config::CacheConfig;

/// Outcome of feeding one event to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Applied,
    /// The event names a guild that isn't cached; nothing changed.
    UnknownGuild,
    /// A message arrived for a channel that isn't cached and was dropped.
    UnknownChannel,
    /// The event doesn't belong to any guild (DMs).
    Ignored,
}

/// All cached guilds. Each guild has its own lock, so events for
/// different guilds never contend.
pub struct StateTracker {
    guilds: DashMap<String, Arc<GuildState>>,
    config: CacheConfig,
}

impl StateTracker {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            guilds: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a guild by ID. The returned handle is detached from the map, so
    /// locking it never holds a map shard.
    pub fn guild(&self, guild_id: &str) -> Option<Arc<GuildState>> {
        self.guilds.get(guild_id).map(|g| g.value().clone())
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    pub fn guild_ids(&self) -> Vec<String> {
        self.guilds.iter().map(|g| g.key().clone()).collect()
    }

    pub fn remove_guild(&self, guild_id: &str) -> Option<Arc<GuildState>> {
        self.guilds.remove(guild_id).map(|(_, g)| g)
    }

    /// Apply one decoded event to the matching guild.
    pub fn handle_event(&self, event: GuildEvent) -> Handled {
        let event_name = event.name();

        match event {
            GuildEvent::GuildCreate(snapshot) => {
                let state = GuildState::new(snapshot, self.config);
                let summary = state.summary();
                info!(
                    guild_id = %summary.id,
                    members = summary.members,
                    channels = summary.channels,
                    "guild cached"
                );
                self.guilds.insert(summary.id.clone(), Arc::new(state));
                Handled::Applied
            }
            GuildEvent::GuildDelete { id } => match self.remove_guild(&id) {
                Some(_) => {
                    info!(guild_id = %id, "guild removed from cache");
                    Handled::Applied
                }
                None => Handled::UnknownGuild,
            },
            event => {
                if event.guild_id().is_empty() {
                    return Handled::Ignored;
                }
                let Some(guild) = self.guild(event.guild_id()) else {
                    debug!(
                        guild_id = %event.guild_id(),
                        event = event_name,
                        "event for unknown guild"
                    );
                    return Handled::UnknownGuild;
                };
                apply(&guild, event)
            }
        }
    }
}

fn apply(guild: &GuildState, event: GuildEvent) -> Handled {
    match event {
        // Guild lifecycle belongs to the tracker, not to a single guild
        GuildEvent::GuildCreate(_) | GuildEvent::GuildDelete { .. } => return Handled::Ignored,
        GuildEvent::GuildUpdate(update) => guild.guild_update(update),
        GuildEvent::GuildMemberAdd(member) | GuildEvent::GuildMemberUpdate(member) => {
            guild.member_add_update(member)
        }
        GuildEvent::GuildMemberRemove { user, .. } => guild.member_remove(&user.id),
        GuildEvent::PresenceUpdate(presence) => guild.presence_add_update(presence),
        GuildEvent::ChannelCreate(channel) | GuildEvent::ChannelUpdate(channel) => {
            guild.channel_add_update(channel);
        }
        GuildEvent::ChannelDelete(channel) => guild.channel_remove(&channel.id),
        GuildEvent::GuildRoleCreate { role, .. } | GuildEvent::GuildRoleUpdate { role, .. } => {
            guild.role_add_update(role)
        }
        GuildEvent::GuildRoleDelete { role_id, .. } => guild.role_remove(&role_id),
        GuildEvent::VoiceStateUpdate(update) => guild.voice_state_update(update),
        GuildEvent::MessageCreate(message) | GuildEvent::MessageUpdate(message) => {
            let channel_id = message.channel_id.clone();
            if !guild.message_add_update(message) {
                debug!(
                    guild_id = %guild.id(),
                    %channel_id,
                    "dropping message for uncached channel"
                );
                return Handled::UnknownChannel;
            }
        }
        GuildEvent::MessageDelete { id, channel_id, .. } => guild.message_remove(&channel_id, &id),
        GuildEvent::MessageDeleteBulk {
            ids, channel_id, ..
        } => guild.message_remove_bulk(&channel_id, &ids),
    }
    Handled::Applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Channel, GuildSnapshot, Message};

    fn tracker() -> StateTracker {
        StateTracker::new(CacheConfig::default())
    }

    fn guild_create(id: &str) -> GuildEvent {
        GuildEvent::GuildCreate(GuildSnapshot {
            id: id.into(),
            name: format!("guild {id}"),
            channels: Some(vec![Channel {
                id: format!("{id}-general"),
                guild_id: id.into(),
                ..Default::default()
            }]),
            ..Default::default()
        })
    }

    fn message(guild_id: &str, channel_id: &str, id: &str) -> GuildEvent {
        GuildEvent::MessageCreate(Message {
            id: id.into(),
            channel_id: channel_id.into(),
            guild_id: guild_id.into(),
            content: "hi".into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_guild_create_and_delete() {
        let tracker = tracker();
        assert_eq!(tracker.handle_event(guild_create("g1")), Handled::Applied);
        assert_eq!(tracker.guild_count(), 1);
        assert!(tracker.guild("g1").unwrap().channel("g1-general").is_some());

        let delete = GuildEvent::GuildDelete { id: "g1".into() };
        assert_eq!(tracker.handle_event(delete.clone()), Handled::Applied);
        assert_eq!(tracker.handle_event(delete), Handled::UnknownGuild);
        assert_eq!(tracker.guild_count(), 0);
    }

    #[test]
    fn test_guild_create_replaces_previous_state() {
        let tracker = tracker();
        tracker.handle_event(guild_create("g1"));
        tracker.handle_event(message("g1", "g1-general", "m1"));
        assert_eq!(tracker.guild("g1").unwrap().messages("g1-general").len(), 1);

        tracker.handle_event(guild_create("g1"));
        assert!(tracker.guild("g1").unwrap().messages("g1-general").is_empty());
    }

    #[test]
    fn test_unknown_guild_and_channel() {
        let tracker = tracker();
        assert_eq!(
            tracker.handle_event(message("g1", "c1", "m1")),
            Handled::UnknownGuild
        );

        tracker.handle_event(guild_create("g1"));
        assert_eq!(
            tracker.handle_event(message("g1", "nope", "m1")),
            Handled::UnknownChannel
        );
        assert_eq!(tracker.handle_event(message("", "dm", "m1")), Handled::Ignored);
    }

    #[test]
    fn test_guilds_are_independent() {
        let tracker = tracker();
        tracker.handle_event(guild_create("g1"));
        tracker.handle_event(guild_create("g2"));

        let g1 = tracker.guild("g1").unwrap();
        let _held = g1.write();
        // g2 is still writable while g1's lock is held
        assert_eq!(
            tracker.handle_event(message("g2", "g2-general", "m1")),
            Handled::Applied
        );

        let mut ids = tracker.guild_ids();
        ids.sort();
        assert_eq!(ids, ["g1", "g2"]);
    }
}
