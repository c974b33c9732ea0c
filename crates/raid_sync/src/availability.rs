//! Availability and composition rules
//!
//! Pure functions over cached entities; no IO. The coordinator consults
//! these before any team mutation so invalid state never reaches the
//! store or the outbound queue.
//!
//! The per-user checks (team membership, schedule overlap, minimum age)
//! run at add-time. The A/B/C bracket rule depends on the whole roster
//! and runs at team-submission time instead.

use chrono::NaiveDate;
use raid_common::entities::{AgeBrackets, CategoryPrice, Category, Race, User};
use raid_common::{CompositionViolation, Result};

/// Why a user cannot join a team for a race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibilityReason {
    /// Already belongs to a team registered for this race
    AlreadyInTeam,
    /// Registered to another race whose time window intersects
    OverlappingRace,
    /// Below the race's minimum participation age (threshold A)
    BelowMinimumAge,
}

impl IneligibilityReason {
    pub fn as_tag(&self) -> &'static str {
        match self {
            IneligibilityReason::AlreadyInTeam => "already_in_team",
            IneligibilityReason::OverlappingRace => "overlapping_race",
            IneligibilityReason::BelowMinimumAge => "below_minimum_age",
        }
    }
}

/// Per-user eligibility verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub user_id: i64,
    pub eligible: bool,
    pub reason: Option<IneligibilityReason>,
}

impl Availability {
    fn eligible(user_id: i64) -> Self {
        Self {
            user_id,
            eligible: true,
            reason: None,
        }
    }

    fn blocked(user_id: i64, reason: IneligibilityReason) -> Self {
        Self {
            user_id,
            eligible: false,
            reason: Some(reason),
        }
    }
}

/// Evaluate one user against one race.
///
/// `committed_races` are the races the user is already registered to,
/// individually or through a team. A user without a recorded birth date
/// passes the age check; the roster bracket rule skips unknown ages too.
pub fn user_availability(
    race: &Race,
    user: &User,
    already_in_team: bool,
    committed_races: &[Race],
    today: NaiveDate,
) -> Availability {
    if already_in_team {
        return Availability::blocked(user.id, IneligibilityReason::AlreadyInTeam);
    }

    let overlap = committed_races
        .iter()
        .any(|other| other.id != race.id && other.window.overlaps(&race.window));
    if overlap {
        return Availability::blocked(user.id, IneligibilityReason::OverlappingRace);
    }

    if let Some(age) = user.age_on(today) {
        if age < race.brackets.a {
            return Availability::blocked(user.id, IneligibilityReason::BelowMinimumAge);
        }
    }

    Availability::eligible(user.id)
}

/// Roster bracket rule, evaluated at team-submission time.
///
/// With thresholds `a < b < c`, a roster is valid when either every age
/// is at least `b`, or at least one age falls in `[a, b)` and at least
/// one age is `c` or more.
pub fn check_team_ages(ages: &[u32], brackets: &AgeBrackets) -> Result<()> {
    if !brackets.ordered() {
        return Err(CompositionViolation::UnorderedBrackets {
            a: brackets.a,
            b: brackets.b,
            c: brackets.c,
        }
        .into());
    }

    if let Some(&age) = ages.iter().find(|&&age| age < brackets.a) {
        return Err(CompositionViolation::BelowBracketFloor {
            age,
            minimum: brackets.a,
        }
        .into());
    }

    let has_junior = ages.iter().any(|&age| age < brackets.b);
    if !has_junior {
        return Ok(());
    }

    let has_escort = ages.iter().any(|&age| age >= brackets.c);
    if has_escort {
        Ok(())
    } else {
        Err(CompositionViolation::JuniorWithoutEscort {
            adult_floor: brackets.b,
            escort_floor: brackets.c,
        }
        .into())
    }
}

/// Price ordering invariant: licensed <= minor <= non-licensed.
/// Categories absent from `prices` are not checked.
pub fn check_price_ordering(prices: &[CategoryPrice]) -> Result<()> {
    let price_of = |category: Category| {
        prices
            .iter()
            .find(|p| p.category == category)
            .map(|p| p.price)
    };

    let licensed = price_of(Category::Licensed);
    let minor = price_of(Category::Minor);
    let non_licensed = price_of(Category::NonLicensedAdult);

    let ordered = match (licensed, minor, non_licensed) {
        (Some(l), Some(m), Some(n)) => l <= m && m <= n,
        (Some(l), Some(m), None) => l <= m,
        (None, Some(m), Some(n)) => m <= n,
        (Some(l), None, Some(n)) => l <= n,
        _ => true,
    };

    if ordered {
        Ok(())
    } else {
        Err(CompositionViolation::PriceOrdering {
            licensed: licensed.unwrap_or(0.0),
            minor: minor.unwrap_or(0.0),
            non_licensed: non_licensed.unwrap_or(0.0),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raid_common::entities::{Bounds, GenderRule, RaceKind, Role, TimeWindow};
    use raid_common::RaidError;
    use chrono::{NaiveDateTime, DateTime, Utc};

    fn dt(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn race(id: i64, begin: &str, end: &str) -> Race {
        Race {
            id,
            raid_id: 1,
            manager_id: 1,
            name: format!("Race {}", id),
            window: TimeWindow {
                begin: dt(begin),
                end: dt(end),
            },
            kind: RaceKind::Leisure,
            difficulty: "easy".into(),
            participants: Bounds { min: 2, max: 50 },
            teams: Bounds { min: 1, max: 20 },
            team_size: Bounds { min: 2, max: 3 },
            brackets: AgeBrackets { a: 8, b: 15, c: 18 },
            gender: GenderRule::Any,
            chip_mandatory: false,
        }
    }

    fn user(id: i64, birth_year: Option<i32>) -> User {
        User {
            id,
            address_id: 1,
            club_id: None,
            email: format!("user{}@example.org", id),
            name: format!("User {}", id),
            licence: None,
            phone: None,
            birth_date: birth_year.map(|y| NaiveDate::from_ymd_opt(y, 1, 1).unwrap()),
            member_since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            roles: vec![Role::Runner],
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    #[test]
    fn team_membership_blocks_first() {
        let race = race(1, "2026-09-01 08:00", "2026-09-01 12:00");
        let verdict = user_availability(&race, &user(5, Some(1990)), true, &[], today());
        assert!(!verdict.eligible);
        assert_eq!(verdict.reason, Some(IneligibilityReason::AlreadyInTeam));
    }

    #[test]
    fn overlapping_race_blocks() {
        let target = race(1, "2026-09-01 08:00", "2026-09-01 12:00");
        let clash = race(2, "2026-09-01 10:00", "2026-09-01 14:00");
        let verdict = user_availability(&target, &user(5, Some(1990)), false, &[clash], today());
        assert_eq!(verdict.reason, Some(IneligibilityReason::OverlappingRace));
    }

    #[test]
    fn own_race_is_not_an_overlap() {
        let target = race(1, "2026-09-01 08:00", "2026-09-01 12:00");
        let verdict = user_availability(
            &target,
            &user(5, Some(1990)),
            false,
            std::slice::from_ref(&target),
            today(),
        );
        assert!(verdict.eligible);
    }

    #[test]
    fn under_minimum_age_blocks() {
        let race = race(1, "2026-09-01 08:00", "2026-09-01 12:00");
        let verdict = user_availability(&race, &user(5, Some(2020)), false, &[], today());
        assert_eq!(verdict.reason, Some(IneligibilityReason::BelowMinimumAge));
    }

    #[test]
    fn unknown_birth_date_passes_the_age_check() {
        let race = race(1, "2026-09-01 08:00", "2026-09-01 12:00");
        let verdict = user_availability(&race, &user(5, None), false, &[], today());
        assert!(verdict.eligible);
    }

    #[test]
    fn bracket_rule_rejects_junior_without_escort() {
        // Worked example: ages [10, 16, 20] with A=12, B=15, C=18.
        // 10 < 12 violates the bracket floor outright.
        let brackets = AgeBrackets { a: 12, b: 15, c: 18 };
        let result = check_team_ages(&[10, 16, 20], &brackets);
        assert!(matches!(
            result,
            Err(RaidError::Composition(CompositionViolation::BelowBracketFloor {
                age: 10,
                minimum: 12
            }))
        ));
    }

    #[test]
    fn bracket_rule_accepts_junior_with_escort() {
        // Worked example: ages [10, 16, 20] with A=8, B=15, C=18.
        // 10 is in [8, 15) and 20 >= 18, so the roster is valid.
        let brackets = AgeBrackets { a: 8, b: 15, c: 18 };
        assert!(check_team_ages(&[10, 16, 20], &brackets).is_ok());
    }

    #[test]
    fn bracket_rule_accepts_all_adults() {
        let brackets = AgeBrackets { a: 8, b: 15, c: 18 };
        assert!(check_team_ages(&[15, 16, 17], &brackets).is_ok());
    }

    #[test]
    fn bracket_rule_rejects_junior_team_without_senior() {
        let brackets = AgeBrackets { a: 8, b: 15, c: 18 };
        let result = check_team_ages(&[10, 16, 17], &brackets);
        assert!(matches!(
            result,
            Err(RaidError::Composition(
                CompositionViolation::JuniorWithoutEscort {
                    adult_floor: 15,
                    escort_floor: 18
                }
            ))
        ));
    }

    #[test]
    fn bracket_rule_rejects_unordered_thresholds() {
        let brackets = AgeBrackets { a: 15, b: 15, c: 18 };
        assert!(matches!(
            check_team_ages(&[20, 21], &brackets),
            Err(RaidError::Composition(
                CompositionViolation::UnorderedBrackets { .. }
            ))
        ));
    }

    #[test]
    fn empty_roster_is_valid() {
        let brackets = AgeBrackets { a: 8, b: 15, c: 18 };
        assert!(check_team_ages(&[], &brackets).is_ok());
    }

    fn price(category: Category, price: f64) -> CategoryPrice {
        CategoryPrice {
            race_id: 1,
            category,
            price,
        }
    }

    #[test]
    fn price_ordering_rejects_licensed_above_minor() {
        // minor 10, licensed 12, non-licensed 8: doubly wrong
        let prices = vec![
            price(Category::Minor, 10.0),
            price(Category::Licensed, 12.0),
            price(Category::NonLicensedAdult, 8.0),
        ];
        assert!(matches!(
            check_price_ordering(&prices),
            Err(RaidError::Composition(
                CompositionViolation::PriceOrdering { .. }
            ))
        ));
    }

    #[test]
    fn price_ordering_accepts_valid_ladder() {
        let prices = vec![
            price(Category::Minor, 10.0),
            price(Category::Licensed, 8.0),
            price(Category::NonLicensedAdult, 12.0),
        ];
        assert!(check_price_ordering(&prices).is_ok());
    }

    #[test]
    fn price_ordering_accepts_equal_prices() {
        let prices = vec![
            price(Category::Minor, 10.0),
            price(Category::Licensed, 10.0),
            price(Category::NonLicensedAdult, 10.0),
        ];
        assert!(check_price_ordering(&prices).is_ok());
    }
}
