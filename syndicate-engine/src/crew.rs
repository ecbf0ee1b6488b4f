//! Crew roster records and the availability state machine.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Availability state of a crew member.
///
/// `Busy` correlates with membership in exactly one active run's staff list;
/// `Unavailable` is the sidelined consequence of a botched outcome and
/// carries an expiry timestamp on the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrewStatus {
    #[default]
    Available,
    Busy,
    Unavailable,
}

impl CrewStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for CrewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unresolved perk choice offered to a member at a star crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPerkChoice {
    pub tier_id: String,
    pub stars_required: u8,
    pub options: Vec<String>,
    #[serde(default)]
    pub is_redemption: bool,
}

/// A single crew member and their progression record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMember {
    pub id: String,
    pub name: String,
    pub role_id: String,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub status: CrewStatus,
    #[serde(default)]
    pub unavailable_until: Option<u64>,
    #[serde(default)]
    pub perks: Vec<String>,
    #[serde(default)]
    pub perk_choices: HashMap<String, String>,
    #[serde(default)]
    pub unchosen: Vec<String>,
    #[serde(default)]
    pub pending_perk_choice: Option<PendingPerkChoice>,
}

impl CrewMember {
    /// Construct a fresh member with no progression.
    #[must_use]
    pub fn new(id: &str, name: &str, role_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role_id: role_id.to_string(),
            xp: 0,
            status: CrewStatus::Available,
            unavailable_until: None,
            perks: Vec::new(),
            perk_choices: HashMap::new(),
            unchosen: Vec::new(),
            pending_perk_choice: None,
        }
    }

    /// Whether the member can be committed to a new run right now.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.status, CrewStatus::Available)
    }

    /// Sideline the member until the given timestamp.
    pub fn sideline_until(&mut self, until_ms: u64) {
        self.status = CrewStatus::Unavailable;
        self.unavailable_until = Some(until_ms);
    }

    /// Clear an expired sideline; no-op for busy or available members.
    pub fn refresh_availability(&mut self, now_ms: u64) {
        if self.status == CrewStatus::Unavailable
            && self.unavailable_until.is_none_or(|until| until <= now_ms)
        {
            self.status = CrewStatus::Available;
            self.unavailable_until = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_member_is_available() {
        let member = CrewMember::new("m1", "Vex", "burglar");
        assert!(member.is_available());
        assert_eq!(member.xp, 0);
        assert!(member.pending_perk_choice.is_none());
    }

    #[test]
    fn sideline_expires_on_refresh() {
        let mut member = CrewMember::new("m1", "Vex", "burglar");
        member.sideline_until(5_000);
        assert!(!member.is_available());

        member.refresh_availability(4_999);
        assert_eq!(member.status, CrewStatus::Unavailable);

        member.refresh_availability(5_000);
        assert!(member.is_available());
        assert!(member.unavailable_until.is_none());
    }

    #[test]
    fn refresh_leaves_busy_members_alone() {
        let mut member = CrewMember::new("m1", "Vex", "burglar");
        member.status = CrewStatus::Busy;
        member.refresh_availability(u64::MAX);
        assert_eq!(member.status, CrewStatus::Busy);
    }

    #[test]
    fn legacy_member_json_backfills_new_fields() {
        let member: CrewMember = serde_json::from_str(
            r#"{"id": "m2", "name": "Sable", "role_id": "fence", "xp": 40}"#,
        )
        .unwrap();
        assert!(member.unchosen.is_empty());
        assert!(member.perk_choices.is_empty());
        assert_eq!(member.status, CrewStatus::Available);
    }
}
