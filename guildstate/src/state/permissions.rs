use bitflags::bitflags;

use crate::model::{Guild, Member, OverwriteKind, PermissionOverwrite};

bitflags! {
    /// Permission bitfield for roles and channel overwrites, using the
    /// gateway's bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u64 {
        // ── General ──
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS          = 1 << 1;
        const BAN_MEMBERS           = 1 << 2;
        const ADMINISTRATOR         = 1 << 3;
        const MANAGE_CHANNELS       = 1 << 4;
        const MANAGE_GUILD          = 1 << 5;
        const ADD_REACTIONS         = 1 << 6;
        const VIEW_AUDIT_LOG        = 1 << 7;

        // ── Channel text ──
        const VIEW_CHANNEL          = 1 << 10;
        const SEND_MESSAGES         = 1 << 11;
        const SEND_TTS_MESSAGES     = 1 << 12;
        const MANAGE_MESSAGES       = 1 << 13;
        const EMBED_LINKS           = 1 << 14;
        const ATTACH_FILES          = 1 << 15;
        const READ_MESSAGE_HISTORY  = 1 << 16;
        const MENTION_EVERYONE      = 1 << 17;
        const USE_EXTERNAL_EMOJIS   = 1 << 18;

        // ── Voice ──
        const CONNECT               = 1 << 20;
        const SPEAK                 = 1 << 21;
        const MUTE_MEMBERS          = 1 << 22;
        const DEAFEN_MEMBERS        = 1 << 23;
        const MOVE_MEMBERS          = 1 << 24;
        const USE_VAD               = 1 << 25;

        // ── Management ──
        const CHANGE_NICKNAME       = 1 << 26;
        const MANAGE_NICKNAMES      = 1 << 27;
        const MANAGE_ROLES          = 1 << 28;
        const MANAGE_WEBHOOKS       = 1 << 29;
        const MANAGE_EMOJIS         = 1 << 30;
    }
}

impl PermissionOverwrite {
    pub fn allowed(&self) -> Permissions {
        Permissions::from_bits_truncate(self.allow)
    }

    pub fn denied(&self) -> Permissions {
        Permissions::from_bits_truncate(self.deny)
    }
}

/// Compute a member's effective permissions, optionally within a channel.
///
/// Algorithm:
///   1. Guild owner gets all permissions unconditionally.
///   2. Start with the `@everyone` role (same ID as the guild).
///   3. OR in all the member's cached role permissions.
///   4. If ADMINISTRATOR is set, return all permissions.
///   5. Apply the `@everyone` overwrite (allow OR, deny AND NOT).
///   6. OR all role allows, AND NOT all role denies.
///   7. Apply the member-specific overwrite.
///
/// Role IDs the member lists but the guild doesn't know are ignored.
pub fn compute_member_permissions(
    guild: &Guild,
    member: &Member,
    overwrites: &[PermissionOverwrite],
) -> Permissions {
    if member.user.id == guild.owner_id {
        return Permissions::all();
    }

    let member_roles = member.role_ids();
    let mut perms = Permissions::empty();
    for role in &guild.roles {
        if role.id == guild.id || member_roles.contains(&role.id) {
            perms |= Permissions::from_bits_truncate(role.permissions);
        }
    }

    if perms.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }

    // Server-level permissions only
    if overwrites.is_empty() {
        return perms;
    }

    if let Some(everyone) = overwrites
        .iter()
        .find(|ov| ov.kind == OverwriteKind::Role && ov.id == guild.id)
    {
        perms |= everyone.allowed();
        perms &= !everyone.denied();
    }

    let mut role_allow = Permissions::empty();
    let mut role_deny = Permissions::empty();
    for ov in overwrites {
        if ov.kind == OverwriteKind::Role && ov.id != guild.id && member_roles.contains(&ov.id) {
            role_allow |= ov.allowed();
            role_deny |= ov.denied();
        }
    }
    perms |= role_allow;
    perms &= !role_deny;

    if let Some(own) = overwrites
        .iter()
        .find(|ov| ov.kind == OverwriteKind::Member && ov.id == member.user.id)
    {
        perms |= own.allowed();
        perms &= !own.denied();
    }

    perms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, User};

    fn role(id: &str, perms: Permissions) -> Role {
        Role {
            id: id.into(),
            permissions: perms.bits(),
            ..Default::default()
        }
    }

    fn guild() -> Guild {
        Guild {
            id: "g1".into(),
            owner_id: "owner".into(),
            roles: vec![
                role("g1", Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES),
                role("mod", Permissions::MANAGE_MESSAGES | Permissions::KICK_MEMBERS),
                role("admin", Permissions::ADMINISTRATOR),
            ],
            ..Default::default()
        }
    }

    fn member(id: &str, roles: &[&str]) -> Member {
        Member {
            user: User {
                id: id.into(),
                ..Default::default()
            },
            roles: Some(roles.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        }
    }

    fn overwrite(
        id: &str,
        kind: OverwriteKind,
        allow: Permissions,
        deny: Permissions,
    ) -> PermissionOverwrite {
        PermissionOverwrite {
            id: id.into(),
            kind,
            allow: allow.bits(),
            deny: deny.bits(),
        }
    }

    #[test]
    fn test_owner_gets_everything() {
        let perms = compute_member_permissions(&guild(), &member("owner", &[]), &[]);
        assert_eq!(perms, Permissions::all());
    }

    #[test]
    fn test_everyone_plus_roles() {
        let perms = compute_member_permissions(&guild(), &member("u1", &["mod"]), &[]);
        assert!(perms.contains(Permissions::SEND_MESSAGES));
        assert!(perms.contains(Permissions::MANAGE_MESSAGES));
        assert!(!perms.contains(Permissions::BAN_MEMBERS));
    }

    #[test]
    fn test_admin_bypasses_overwrites() {
        let deny_all = overwrite(
            "g1",
            OverwriteKind::Role,
            Permissions::empty(),
            Permissions::all(),
        );
        let perms = compute_member_permissions(&guild(), &member("u1", &["admin"]), &[deny_all]);
        assert_eq!(perms, Permissions::all());
    }

    #[test]
    fn test_overwrite_order() {
        let overwrites = vec![
            overwrite(
                "g1",
                OverwriteKind::Role,
                Permissions::empty(),
                Permissions::SEND_MESSAGES,
            ),
            overwrite(
                "mod",
                OverwriteKind::Role,
                Permissions::SEND_MESSAGES,
                Permissions::empty(),
            ),
            overwrite(
                "u1",
                OverwriteKind::Member,
                Permissions::empty(),
                Permissions::VIEW_CHANNEL,
            ),
        ];

        let plain = compute_member_permissions(&guild(), &member("u2", &[]), &overwrites);
        assert!(!plain.contains(Permissions::SEND_MESSAGES));
        assert!(plain.contains(Permissions::VIEW_CHANNEL));

        let moderator =
            compute_member_permissions(&guild(), &member("u1", &["mod"]), &overwrites);
        assert!(moderator.contains(Permissions::SEND_MESSAGES));
        assert!(!moderator.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_unknown_roles_ignored() {
        let perms = compute_member_permissions(&guild(), &member("u1", &["ghost"]), &[]);
        assert_eq!(perms, Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES);
    }
}
