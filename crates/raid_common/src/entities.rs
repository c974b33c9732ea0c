//! Canonical in-memory entities
//!
//! One typed struct per entity kind, shared by the wire mappers, the local
//! store and the coordinator. Wire payloads and storage columns both map
//! onto these; neither representation leaks past its own crate.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A closed time interval used for raid/race schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { begin, end }
    }

    /// Half-open intersection test: touching endpoints do not overlap
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }
}

/// Postal address, referenced by users, clubs and raids.
/// Immutable once created; no update path exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub postal_code: String,
    pub city: String,
    pub street: String,
    pub number: String,
}

/// Role tags carried by a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Runner,
    SiteManager,
    ClubManager,
    RaidManager,
    RaceManager,
}

impl Role {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Role::Runner => "runner",
            Role::SiteManager => "site_manager",
            Role::ClubManager => "club_manager",
            Role::RaidManager => "raid_manager",
            Role::RaceManager => "race_manager",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Role> {
        match tag {
            "runner" => Some(Role::Runner),
            "site_manager" => Some(Role::SiteManager),
            "club_manager" => Some(Role::ClubManager),
            "raid_manager" => Some(Role::RaidManager),
            "race_manager" => Some(Role::RaceManager),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub address_id: i64,
    pub club_id: Option<i64>,
    pub email: String,
    pub name: String,
    pub licence: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub member_since: NaiveDate,
    pub roles: Vec<Role>,
}

impl User {
    /// Age in whole years as of `today`, when a birth date is recorded
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: i64,
    pub responsible_id: i64,
    pub address_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raid {
    pub id: i64,
    pub club_id: i64,
    pub address_id: i64,
    pub manager_id: i64,
    pub name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    /// Event window
    pub window: TimeWindow,
    /// Registration window
    pub registration: TimeWindow,
    /// Maximum number of races this raid may carry
    pub nb_races: u32,
}

impl Raid {
    /// Whether the registration window sits inside the event window.
    /// Not enforced on any write path; exposed so callers can warn.
    pub fn windows_consistent(&self) -> bool {
        self.window.contains(&self.registration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceKind {
    Competitive,
    Leisure,
}

impl RaceKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            RaceKind::Competitive => "competitive",
            RaceKind::Leisure => "leisure",
        }
    }

    pub fn from_tag(tag: &str) -> Option<RaceKind> {
        match tag {
            "competitive" => Some(RaceKind::Competitive),
            "leisure" => Some(RaceKind::Leisure),
            _ => None,
        }
    }
}

/// Gender constraint on race participation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderRule {
    Any,
    Women,
    Men,
    Mixed,
}

impl GenderRule {
    pub fn as_tag(&self) -> &'static str {
        match self {
            GenderRule::Any => "any",
            GenderRule::Women => "women",
            GenderRule::Men => "men",
            GenderRule::Mixed => "mixed",
        }
    }

    pub fn from_tag(tag: &str) -> Option<GenderRule> {
        match tag {
            "any" => Some(GenderRule::Any),
            "women" => Some(GenderRule::Women),
            "men" => Some(GenderRule::Men),
            "mixed" => Some(GenderRule::Mixed),
            _ => None,
        }
    }
}

/// Inclusive min/max pair for participant and team counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

/// The three ordered age thresholds of a race: `a < b < c`
///
/// `a` is the minimum participation age, `b` the adult floor, `c` the
/// escort floor for teams carrying members in `[a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeBrackets {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl AgeBrackets {
    pub fn ordered(&self) -> bool {
        self.a < self.b && self.b < self.c
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub id: i64,
    pub raid_id: i64,
    pub manager_id: i64,
    pub name: String,
    pub window: TimeWindow,
    pub kind: RaceKind,
    pub difficulty: String,
    pub participants: Bounds,
    pub teams: Bounds,
    pub team_size: Bounds,
    pub brackets: AgeBrackets,
    pub gender: GenderRule,
    pub chip_mandatory: bool,
}

/// Fixed reference set of pricing categories; never created or deleted
/// at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Minor,
    NonLicensedAdult,
    Licensed,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Minor, Category::NonLicensedAdult, Category::Licensed];

    pub fn as_tag(&self) -> &'static str {
        match self {
            Category::Minor => "minor",
            Category::NonLicensedAdult => "non_licensed_adult",
            Category::Licensed => "licensed",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Category> {
        match tag {
            "minor" => Some(Category::Minor),
            "non_licensed_adult" => Some(Category::NonLicensedAdult),
            "licensed" => Some(Category::Licensed),
            _ => None,
        }
    }
}

/// Per-(race, category) entry fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPrice {
    pub race_id: i64,
    pub category: Category,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub manager_id: i64,
    pub name: String,
    pub image: Option<String>,
}

/// Team-to-race registration carrying per-race state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRegistration {
    pub team_id: i64,
    pub race_id: i64,
    pub validated: bool,
    pub finish_time: Option<DateTime<Utc>>,
    pub bib: Option<i64>,
}

/// Individual runner-to-race registration
///
/// `pps_document` (proof-of-sport form) is required when the runner holds
/// no licence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRegistration {
    pub user_id: i64,
    pub race_id: i64,
    pub chip_number: Option<i64>,
    pub finish_time: Option<DateTime<Utc>>,
    pub pps_document: Option<String>,
}

/// Action tag for a queued offline write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundAction {
    CreateAddress,
    CreateUser,
    UpdateUser,
    CreateClub,
    UpdateClub,
    DeleteClub,
    CreateRaid,
    UpdateRaid,
    DeleteRaid,
    CreateRace,
    DeleteRace,
    CreateTeam,
    AddTeamMember,
    RegisterTeam,
    RegisterRunner,
}

impl OutboundAction {
    pub fn as_tag(&self) -> &'static str {
        match self {
            OutboundAction::CreateAddress => "create_address",
            OutboundAction::CreateUser => "create_user",
            OutboundAction::UpdateUser => "update_user",
            OutboundAction::CreateClub => "create_club",
            OutboundAction::UpdateClub => "update_club",
            OutboundAction::DeleteClub => "delete_club",
            OutboundAction::CreateRaid => "create_raid",
            OutboundAction::UpdateRaid => "update_raid",
            OutboundAction::DeleteRaid => "delete_raid",
            OutboundAction::CreateRace => "create_race",
            OutboundAction::DeleteRace => "delete_race",
            OutboundAction::CreateTeam => "create_team",
            OutboundAction::AddTeamMember => "add_team_member",
            OutboundAction::RegisterTeam => "register_team",
            OutboundAction::RegisterRunner => "register_runner",
        }
    }

    /// Creates assign a provisional clock id while offline; replay swaps
    /// it for the server id once the entry lands.
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            OutboundAction::CreateAddress
                | OutboundAction::CreateUser
                | OutboundAction::CreateClub
                | OutboundAction::CreateRaid
                | OutboundAction::CreateRace
                | OutboundAction::CreateTeam
        )
    }

    pub fn from_tag(tag: &str) -> Option<OutboundAction> {
        match tag {
            "create_address" => Some(OutboundAction::CreateAddress),
            "create_user" => Some(OutboundAction::CreateUser),
            "update_user" => Some(OutboundAction::UpdateUser),
            "create_club" => Some(OutboundAction::CreateClub),
            "update_club" => Some(OutboundAction::UpdateClub),
            "delete_club" => Some(OutboundAction::DeleteClub),
            "create_raid" => Some(OutboundAction::CreateRaid),
            "update_raid" => Some(OutboundAction::UpdateRaid),
            "delete_raid" => Some(OutboundAction::DeleteRaid),
            "create_race" => Some(OutboundAction::CreateRace),
            "delete_race" => Some(OutboundAction::DeleteRace),
            "create_team" => Some(OutboundAction::CreateTeam),
            "add_team_member" => Some(OutboundAction::AddTeamMember),
            "register_team" => Some(OutboundAction::RegisterTeam),
            "register_runner" => Some(OutboundAction::RegisterRunner),
        _ => None,
        }
    }
}

/// A write that could not reach the remote system, replayed later in FIFO
/// order by creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEntry {
    pub id: i64,
    pub action: OutboundAction,
    pub payload: serde_json::Value,
    /// Unix epoch milliseconds
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn window(begin: &str, end: &str) -> TimeWindow {
        let parse = |s: &str| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
                .unwrap()
                .and_utc()
        };
        TimeWindow::new(parse(begin), parse(end))
    }

    #[test]
    fn overlap_is_half_open() {
        let morning = window("2026-05-01 08:00", "2026-05-01 12:00");
        let afternoon = window("2026-05-01 12:00", "2026-05-01 18:00");
        let late_morning = window("2026-05-01 11:00", "2026-05-01 13:00");

        assert!(!morning.overlaps(&afternoon));
        assert!(morning.overlaps(&late_morning));
        assert!(late_morning.overlaps(&afternoon));
    }

    #[test]
    fn age_counts_whole_years() {
        let user = User {
            id: 1,
            address_id: 1,
            club_id: None,
            email: "runner@example.org".into(),
            name: "Runner".into(),
            licence: None,
            phone: None,
            birth_date: Some(NaiveDate::from_ymd_opt(2008, 6, 15).unwrap()),
            member_since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            roles: vec![Role::Runner],
        };

        let before_birthday = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        let on_birthday = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(user.age_on(before_birthday), Some(17));
        assert_eq!(user.age_on(on_birthday), Some(18));
    }

    #[test]
    fn age_is_unknown_without_birth_date() {
        let user = User {
            id: 1,
            address_id: 1,
            club_id: None,
            email: "runner@example.org".into(),
            name: "Runner".into(),
            licence: None,
            phone: None,
            birth_date: None,
            member_since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            roles: vec![],
        };
        assert_eq!(user.age_on(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()), None);
    }

    #[test]
    fn role_tags_round_trip() {
        for role in [
            Role::Runner,
            Role::SiteManager,
            Role::ClubManager,
            Role::RaidManager,
            Role::RaceManager,
        ] {
            assert_eq!(Role::from_tag(role.as_tag()), Some(role));
        }
        assert_eq!(Role::from_tag("referee"), None);
    }

    #[test]
    fn brackets_must_strictly_increase() {
        assert!(AgeBrackets { a: 8, b: 15, c: 18 }.ordered());
        assert!(!AgeBrackets { a: 15, b: 15, c: 18 }.ordered());
        assert!(!AgeBrackets { a: 18, b: 15, c: 8 }.ordered());
    }
}
