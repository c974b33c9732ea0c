//! Entity builders with sensible defaults
//!
//! Each builder takes the fields a test usually varies and fills the
//! rest with fixed values. Dates are anchored in 2026 so age math stays
//! stable relative to [`today`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use raid_common::entities::{
    Address, AgeBrackets, Bounds, CategoryPrice, Category, Club, GenderRule, Race, RaceKind, Raid,
    Role, Team, TimeWindow, User,
};

/// Parse `"YYYY-MM-DD HH:MM"` as UTC
pub fn dt(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .expect("fixture datetime")
        .and_utc()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("fixture date")
}

/// Fixed reference date for age computations
pub fn today() -> NaiveDate {
    date("2026-08-01")
}

pub fn address(id: i64) -> Address {
    Address {
        id,
        postal_code: "35000".to_string(),
        city: "Rennes".to_string(),
        street: "rue de la Monnaie".to_string(),
        number: format!("{id}"),
    }
}

pub fn user(id: i64, birth_year: Option<i32>) -> User {
    User {
        id,
        address_id: 1,
        club_id: None,
        email: format!("user{id}@example.org"),
        name: format!("User {id}"),
        licence: Some(format!("LIC{id:04}")),
        phone: None,
        birth_date: birth_year.and_then(|y| NaiveDate::from_ymd_opt(y, 6, 15)),
        member_since: date("2024-01-01"),
        roles: vec![Role::Runner],
    }
}

/// A runner without a licence number or proof-of-sport document
pub fn unlicensed_user(id: i64, birth_year: Option<i32>) -> User {
    User {
        licence: None,
        ..user(id, birth_year)
    }
}

pub fn club(id: i64) -> Club {
    Club {
        id,
        responsible_id: 1,
        address_id: 1,
        name: format!("Club {id}"),
    }
}

pub fn raid(id: i64, nb_races: u32) -> Raid {
    Raid {
        id,
        club_id: 1,
        address_id: 1,
        manager_id: 1,
        name: format!("Raid {id}"),
        contact_email: Some("contact@example.org".to_string()),
        contact_phone: None,
        window: TimeWindow {
            begin: dt("2026-09-01 08:00"),
            end: dt("2026-09-02 18:00"),
        },
        registration: TimeWindow {
            begin: dt("2026-08-01 00:00"),
            end: dt("2026-08-28 23:59"),
        },
        nb_races,
    }
}

pub fn race(id: i64, raid_id: i64) -> Race {
    Race {
        id,
        raid_id,
        manager_id: 1,
        name: format!("Race {id}"),
        window: TimeWindow {
            begin: dt("2026-09-01 09:00"),
            end: dt("2026-09-01 13:00"),
        },
        kind: RaceKind::Leisure,
        difficulty: "medium".to_string(),
        participants: Bounds { min: 2, max: 100 },
        teams: Bounds { min: 1, max: 30 },
        team_size: Bounds { min: 2, max: 4 },
        brackets: AgeBrackets { a: 8, b: 15, c: 18 },
        gender: GenderRule::Any,
        chip_mandatory: false,
    }
}

/// Same raid, different time slot; for overlap tests
pub fn race_at(id: i64, raid_id: i64, begin: &str, end: &str) -> Race {
    Race {
        window: TimeWindow {
            begin: dt(begin),
            end: dt(end),
        },
        ..race(id, raid_id)
    }
}

pub fn team(id: i64) -> Team {
    Team {
        id,
        manager_id: 1,
        name: format!("Team {id}"),
        image: None,
    }
}

pub fn price(race_id: i64, category: Category, price: f64) -> CategoryPrice {
    CategoryPrice {
        race_id,
        category,
        price,
    }
}

/// A valid licensed <= minor <= non-licensed price ladder
pub fn price_ladder(race_id: i64) -> Vec<CategoryPrice> {
    vec![
        price(race_id, Category::Licensed, 8.0),
        price(race_id, Category::Minor, 10.0),
        price(race_id, Category::NonLicensedAdult, 12.0),
    ]
}
