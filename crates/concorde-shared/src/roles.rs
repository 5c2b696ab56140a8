//! Power-level role tiers.
//!
//! The protocol expresses authority as an integer power level (0–100); the
//! application presents these as named roles. The engine only uses tiers
//! for display metadata — it never enforces permissions.

pub const POWER_LEVEL_OWNER: i64 = 100;
pub const POWER_LEVEL_ADMIN: i64 = 50;
pub const POWER_LEVEL_MODERATOR: i64 = 25;
pub const POWER_LEVEL_MEMBER: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleTier {
    pub name: &'static str,
    pub power_level: i64,
}

/// Role tiers, highest first.
pub const ROLE_TIERS: [RoleTier; 4] = [
    RoleTier {
        name: "Owner",
        power_level: POWER_LEVEL_OWNER,
    },
    RoleTier {
        name: "Admin",
        power_level: POWER_LEVEL_ADMIN,
    },
    RoleTier {
        name: "Moderator",
        power_level: POWER_LEVEL_MODERATOR,
    },
    RoleTier {
        name: "Member",
        power_level: POWER_LEVEL_MEMBER,
    },
];

/// The highest tier the given power level satisfies.
pub fn role_for_power_level(power_level: i64) -> &'static RoleTier {
    ROLE_TIERS
        .iter()
        .find(|tier| power_level >= tier.power_level)
        .unwrap_or(&ROLE_TIERS[3])
}

/// Badge name for a power level, or `None` for the base Member tier.
pub fn role_name(power_level: i64) -> Option<&'static str> {
    let tier = role_for_power_level(power_level);
    if tier.power_level == POWER_LEVEL_MEMBER {
        None
    } else {
        Some(tier.name)
    }
}
