//! Effective permission computation for guild members.
//!
//! Base permissions come from `@everyone` (the role whose id equals the guild
//! id) plus the member's roles. Channel overwrites apply in three layers:
//! `@everyone`, then all member roles together, then the member itself.

use crate::transport::{GuildId, Permissions, RoleId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: u64,
    pub deny: u64,
}

/// What the guild knows about one member.
#[derive(Debug, Clone)]
pub struct MemberRoles<'a> {
    pub guild: GuildId,
    pub owner: UserId,
    pub member: UserId,
    pub member_roles: &'a [RoleId],
    /// Every role of the guild with its permission bits.
    pub guild_roles: &'a [(RoleId, u64)],
}

pub fn base_permissions(roles: &MemberRoles<'_>) -> Permissions {
    if roles.member == roles.owner {
        return Permissions::ALL;
    }

    let everyone = RoleId(roles.guild.get());
    let bits = roles
        .guild_roles
        .iter()
        .filter(|(id, _)| *id == everyone || roles.member_roles.contains(id))
        .fold(0, |acc, (_, bits)| acc | bits);
    let base = Permissions(bits);

    if base.contains(Permissions::ADMINISTRATOR) {
        Permissions::ALL
    } else {
        base
    }
}

pub fn channel_permissions(roles: &MemberRoles<'_>, overwrites: &[Overwrite]) -> Permissions {
    let base = base_permissions(roles);
    if base == Permissions::ALL {
        return base;
    }

    let everyone = RoleId(roles.guild.get());
    let mut perms = base;

    if let Some(ow) = overwrites
        .iter()
        .find(|ow| ow.target == OverwriteTarget::Role(everyone))
    {
        perms = perms.overwrite(ow.allow, ow.deny);
    }

    let (allow, deny) = overwrites
        .iter()
        .filter(|ow| match ow.target {
            OverwriteTarget::Role(id) => id != everyone && roles.member_roles.contains(&id),
            OverwriteTarget::Member(_) => false,
        })
        .fold((0, 0), |(allow, deny), ow| (allow | ow.allow, deny | ow.deny));
    perms = perms.overwrite(allow, deny);

    if let Some(ow) = overwrites
        .iter()
        .find(|ow| ow.target == OverwriteTarget::Member(roles.member))
    {
        perms = perms.overwrite(ow.allow, ow.deny);
    }

    perms
}
