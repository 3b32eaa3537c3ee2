use serde::{Deserialize, Serialize};

use crate::model::{Channel, GuildSnapshot, Member, Message, Presence, Role, User, VoiceState};

/// An already-decoded gateway event that touches guild state.
///
/// Serialized the way the gateway frames dispatches: the event name in `t`
/// and the payload in `d`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuildEvent {
    /// Initial full load of a guild (or the guild becoming available again).
    GuildCreate(GuildSnapshot),

    /// Full or partial guild metadata update.
    GuildUpdate(GuildSnapshot),

    /// The guild is gone or unavailable.
    GuildDelete { id: String },

    GuildMemberAdd(Member),

    GuildMemberUpdate(Member),

    GuildMemberRemove { guild_id: String, user: User },

    PresenceUpdate(Presence),

    ChannelCreate(Channel),

    ChannelUpdate(Channel),

    ChannelDelete(Channel),

    GuildRoleCreate { guild_id: String, role: Role },

    GuildRoleUpdate { guild_id: String, role: Role },

    GuildRoleDelete { guild_id: String, role_id: String },

    /// A user joined, moved between or left voice channels.
    VoiceStateUpdate(VoiceState),

    MessageCreate(Message),

    /// Partial message: only the changed fields are set.
    MessageUpdate(Message),

    MessageDelete {
        id: String,
        channel_id: String,
        #[serde(default)]
        guild_id: String,
    },

    MessageDeleteBulk {
        ids: Vec<String>,
        channel_id: String,
        #[serde(default)]
        guild_id: String,
    },
}

impl GuildEvent {
    /// Decode one JSON-framed event.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The guild this event applies to. Empty for events outside a guild,
    /// such as DM channel and message events.
    pub fn guild_id(&self) -> &str {
        match self {
            Self::GuildCreate(g) | Self::GuildUpdate(g) => &g.id,
            Self::GuildDelete { id } => id,
            Self::GuildMemberAdd(m) | Self::GuildMemberUpdate(m) => &m.guild_id,
            Self::GuildMemberRemove { guild_id, .. }
            | Self::GuildRoleCreate { guild_id, .. }
            | Self::GuildRoleUpdate { guild_id, .. }
            | Self::GuildRoleDelete { guild_id, .. }
            | Self::MessageDelete { guild_id, .. }
            | Self::MessageDeleteBulk { guild_id, .. } => guild_id,
            Self::PresenceUpdate(p) => &p.guild_id,
            Self::ChannelCreate(c) | Self::ChannelUpdate(c) | Self::ChannelDelete(c) => &c.guild_id,
            Self::VoiceStateUpdate(v) => &v.guild_id,
            Self::MessageCreate(m) | Self::MessageUpdate(m) => &m.guild_id,
        }
    }

    /// Gateway event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GuildCreate(_) => "GUILD_CREATE",
            Self::GuildUpdate(_) => "GUILD_UPDATE",
            Self::GuildDelete { .. } => "GUILD_DELETE",
            Self::GuildMemberAdd(_) => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate(_) => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove { .. } => "GUILD_MEMBER_REMOVE",
            Self::PresenceUpdate(_) => "PRESENCE_UPDATE",
            Self::ChannelCreate(_) => "CHANNEL_CREATE",
            Self::ChannelUpdate(_) => "CHANNEL_UPDATE",
            Self::ChannelDelete(_) => "CHANNEL_DELETE",
            Self::GuildRoleCreate { .. } => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate { .. } => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete { .. } => "GUILD_ROLE_DELETE",
            Self::VoiceStateUpdate(_) => "VOICE_STATE_UPDATE",
            Self::MessageCreate(_) => "MESSAGE_CREATE",
            Self::MessageUpdate(_) => "MESSAGE_UPDATE",
            Self::MessageDelete { .. } => "MESSAGE_DELETE",
            Self::MessageDeleteBulk { .. } => "MESSAGE_DELETE_BULK",
        }
    }
}
