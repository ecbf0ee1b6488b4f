//! Crew XP, star-tier crossings, and the pending-perk-choice machine.
use thiserror::Error;

use crate::catalog::Catalog;
use crate::config::EngineCfg;
use crate::crew::PendingPerkChoice;
use crate::state::{LOG_PERK_CHOSEN_PREFIX, LOG_STAR_GAINED_PREFIX, WorldState};

/// Tier id used for the star-5 second-chance choice.
pub const REDEMPTION_TIER: &str = "redemption";
const REDEMPTION_STARS: u8 = 5;

/// Why a perk choice was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerkError {
    #[error("crew member {0} not found")]
    UnknownMember(String),
    #[error("crew member {0} has no pending perk choice")]
    NoPendingChoice(String),
    #[error("perk {perk_id} is not offered to {member_id}")]
    PerkNotOffered { member_id: String, perk_id: String },
}

/// Grant completion XP to every assigned member and react to star
/// crossings. A member with an unresolved pending choice keeps it; new
/// crossings never overwrite it.
pub fn grant_completion_xp(
    state: &mut WorldState,
    catalog: &Catalog,
    staff_ids: &[String],
    amount: u32,
    cfg: &EngineCfg,
) {
    for id in staff_ids {
        let Some(member) = state.member(id) else {
            continue;
        };
        let Some(role) = catalog.role(&member.role_id) else {
            // Role missing from the catalog; bank the XP anyway.
            if let Some(member) = state.member_mut(id) {
                member.xp = member.xp.saturating_add(amount);
            }
            continue;
        };
        let role = role.clone();

        let member = state
            .member_mut(id)
            .expect("member presence checked above");
        let stars_before = role.stars_for_xp(member.xp);
        member.xp = member.xp.saturating_add(amount);
        let stars_after = role.stars_for_xp(member.xp);
        if stars_after <= stars_before {
            continue;
        }

        for stars in (stars_before + 1)..=stars_after {
            if member.pending_perk_choice.is_some() {
                break;
            }
            if stars >= REDEMPTION_STARS {
                if !member.unchosen.is_empty() {
                    member.pending_perk_choice = Some(PendingPerkChoice {
                        tier_id: REDEMPTION_TIER.to_string(),
                        stars_required: REDEMPTION_STARS,
                        options: member.unchosen.clone(),
                        is_redemption: true,
                    });
                }
            } else if let Some(tier) = role.tier_at(stars)
                && !member.perk_choices.contains_key(&tier.tier_id)
            {
                member.pending_perk_choice = Some(PendingPerkChoice {
                    tier_id: tier.tier_id.clone(),
                    stars_required: tier.stars_required,
                    options: tier.options.clone(),
                    is_redemption: false,
                });
            }
        }

        let member_id = id.clone();
        state.push_log(
            format!("{LOG_STAR_GAINED_PREFIX}{member_id}.{stars_after}"),
            cfg.log_tail_cap,
        );
    }
}

/// Resolve a member's pending perk choice.
///
/// A normal choice banks the declined siblings for the star-5 redemption
/// offer; a redemption choice consumes its pick from that bank.
///
/// # Errors
///
/// Fails with an explicit reason when no choice is pending or the perk id
/// is not among the offered options.
pub fn choose_perk(
    state: &mut WorldState,
    member_id: &str,
    perk_id: &str,
    cfg: &EngineCfg,
) -> Result<(), PerkError> {
    let member = state
        .member_mut(member_id)
        .ok_or_else(|| PerkError::UnknownMember(member_id.to_string()))?;
    let Some(pending) = &member.pending_perk_choice else {
        return Err(PerkError::NoPendingChoice(member_id.to_string()));
    };
    if !pending.options.iter().any(|option| option == perk_id) {
        return Err(PerkError::PerkNotOffered {
            member_id: member_id.to_string(),
            perk_id: perk_id.to_string(),
        });
    }

    let pending = member
        .pending_perk_choice
        .take()
        .expect("pending presence checked above");
    member.perks.push(perk_id.to_string());
    member
        .perk_choices
        .insert(pending.tier_id.clone(), perk_id.to_string());
    if pending.is_redemption {
        member.unchosen.retain(|banked| banked != perk_id);
    } else {
        for declined in pending
            .options
            .iter()
            .filter(|option| option.as_str() != perk_id)
        {
            if !member.unchosen.contains(declined) && !member.perks.contains(declined) {
                member.unchosen.push(declined.clone());
            }
        }
    }

    state.push_log(
        format!("{LOG_PERK_CHOSEN_PREFIX}{member_id}.{perk_id}"),
        cfg.log_tail_cap,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PerkTier, Role, StarThreshold};
    use crate::crew::CrewMember;

    fn make_catalog() -> Catalog {
        let mut catalog = Catalog::empty();
        catalog.roles.push(Role {
            id: "burglar".into(),
            name: "Burglar".into(),
            xp_to_stars: vec![
                StarThreshold { stars: 1, min_xp: 10 },
                StarThreshold { stars: 2, min_xp: 25 },
                StarThreshold { stars: 3, min_xp: 50 },
                StarThreshold { stars: 4, min_xp: 90 },
                StarThreshold { stars: 5, min_xp: 150 },
            ],
            perk_choices: vec![
                PerkTier {
                    tier_id: "t2".into(),
                    stars_required: 2,
                    options: vec!["ghost".into(), "muscle".into(), "wheelman".into()],
                },
                PerkTier {
                    tier_id: "t3".into(),
                    stars_required: 3,
                    options: vec!["cooler".into(), "spotter".into()],
                },
            ],
        });
        catalog
    }

    fn state_with_member(xp: u32) -> WorldState {
        let mut state = WorldState::default();
        let mut member = CrewMember::new("vex", "Vex", "burglar");
        member.xp = xp;
        state.crew.push(member);
        state
    }

    #[test]
    fn star_crossing_sets_pending_choice_once() {
        let catalog = make_catalog();
        let cfg = EngineCfg::default();
        let mut state = state_with_member(20);

        grant_completion_xp(&mut state, &catalog, &["vex".into()], 10, &cfg);
        let pending = state.member("vex").unwrap().pending_perk_choice.clone();
        assert_eq!(pending.as_ref().map(|p| p.tier_id.as_str()), Some("t2"));

        // Further completions must not re-trigger or overwrite.
        grant_completion_xp(&mut state, &catalog, &["vex".into()], 30, &cfg);
        let still = state.member("vex").unwrap().pending_perk_choice.clone();
        assert_eq!(still, pending);
    }

    #[test]
    fn choose_perk_banks_declined_options() {
        let catalog = make_catalog();
        let cfg = EngineCfg::default();
        let mut state = state_with_member(20);
        grant_completion_xp(&mut state, &catalog, &["vex".into()], 10, &cfg);

        choose_perk(&mut state, "vex", "ghost", &cfg).unwrap();
        let member = state.member("vex").unwrap();
        assert_eq!(member.perks, vec!["ghost".to_string()]);
        assert_eq!(member.perk_choices.get("t2").map(String::as_str), Some("ghost"));
        let mut banked = member.unchosen.clone();
        banked.sort();
        assert_eq!(banked, vec!["muscle".to_string(), "wheelman".to_string()]);
        assert!(member.pending_perk_choice.is_none());
    }

    #[test]
    fn choose_perk_rejects_bad_requests() {
        let catalog = make_catalog();
        let cfg = EngineCfg::default();
        let mut state = state_with_member(0);

        assert_eq!(
            choose_perk(&mut state, "nobody", "ghost", &cfg),
            Err(PerkError::UnknownMember("nobody".into()))
        );
        assert_eq!(
            choose_perk(&mut state, "vex", "ghost", &cfg),
            Err(PerkError::NoPendingChoice("vex".into()))
        );

        grant_completion_xp(&mut state, &catalog, &["vex".into()], 30, &cfg);
        assert_eq!(
            choose_perk(&mut state, "vex", "not-offered", &cfg),
            Err(PerkError::PerkNotOffered {
                member_id: "vex".into(),
                perk_id: "not-offered".into(),
            })
        );
        // The pending choice survives a rejected pick.
        assert!(state.member("vex").unwrap().pending_perk_choice.is_some());
    }

    #[test]
    fn fifth_star_offers_redemption_from_bank() {
        let catalog = make_catalog();
        let cfg = EngineCfg::default();
        let mut state = state_with_member(20);

        grant_completion_xp(&mut state, &catalog, &["vex".into()], 10, &cfg);
        choose_perk(&mut state, "vex", "ghost", &cfg).unwrap();
        grant_completion_xp(&mut state, &catalog, &["vex".into()], 30, &cfg);
        choose_perk(&mut state, "vex", "cooler", &cfg).unwrap();

        // Jump past stars 4 and 5 in one grant.
        grant_completion_xp(&mut state, &catalog, &["vex".into()], 200, &cfg);
        let pending = state
            .member("vex")
            .unwrap()
            .pending_perk_choice
            .clone()
            .expect("redemption offered");
        assert!(pending.is_redemption);
        assert_eq!(pending.tier_id, REDEMPTION_TIER);
        assert!(pending.options.contains(&"muscle".to_string()));

        choose_perk(&mut state, "vex", "muscle", &cfg).unwrap();
        let member = state.member("vex").unwrap();
        assert!(!member.unchosen.contains(&"muscle".to_string()));
        assert!(member.perks.contains(&"muscle".to_string()));
    }

    #[test]
    fn redemption_skipped_with_empty_bank() {
        let catalog = make_catalog();
        let cfg = EngineCfg::default();
        let mut state = state_with_member(149);

        grant_completion_xp(&mut state, &catalog, &["vex".into()], 1, &cfg);
        assert!(state.member("vex").unwrap().pending_perk_choice.is_none());
    }
}
