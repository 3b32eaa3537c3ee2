use crate::model::{Member, Presence, User};

/// One user's cached membership and presence. Either half may arrive first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberState {
    pub member: Option<Member>,
    pub presence: Option<Presence>,
}

impl MemberState {
    pub fn from_member(member: Member) -> Self {
        Self {
            member: Some(member),
            presence: None,
        }
    }

    pub fn from_presence(presence: Presence) -> Self {
        Self {
            member: None,
            presence: Some(presence),
        }
    }

    /// The best-known user object: membership data wins over presence data.
    pub fn user(&self) -> Option<&User> {
        self.member
            .as_ref()
            .map(|m| &m.user)
            .or_else(|| self.presence.as_ref().map(|p| &p.user))
    }

    /// Merge a membership update.
    ///
    /// An empty `joined_at` and an absent role list mean "unspecified".
    /// Nick and user are always present on member events and always replaced.
    pub(crate) fn apply_member(&mut self, update: Member) {
        let Some(existing) = self.member.as_mut() else {
            self.member = Some(update);
            return;
        };

        if !update.joined_at.is_empty() {
            existing.joined_at = update.joined_at;
        }
        if update.roles.is_some() {
            existing.roles = update.roles;
        }
        existing.nick = update.nick;
        existing.user = update.user;
    }

    /// Merge a presence update.
    ///
    /// `game` is always overwritten: `None` means "not doing anything", and
    /// the gateway gives no way to tell that apart from "not included".
    /// Status is only replaced when non-empty.
    pub(crate) fn apply_presence(&mut self, update: Presence) {
        let Some(existing) = self.presence.as_mut() else {
            self.presence = Some(update);
            return;
        };

        existing.game = update.game;
        if !update.status.is_empty() {
            existing.status = update.status;
        }
    }
}
