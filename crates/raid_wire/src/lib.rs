//! Wire mappers: API JSON <-> canonical entities
//!
//! The backend nests relation objects in responses (a raid may embed its
//! `club`, `address` and `manager`) while outbound payloads carry flat
//! foreign keys. This crate is the single place where wire field names are
//! known; the store and coordinator never touch raw JSON.
//!
//! Mappers are total over optional fields: a malformed phone number or
//! birth date maps to `None`. A missing entity id, or a required field the
//! reconciler would have to invent (names, windows, bounds), is a
//! [`RaidError::Mapping`] error.

use chrono::{DateTime, NaiveDate, Utc};
use raid_common::entities::{
    Address, AgeBrackets, Bounds, Category, CategoryPrice, Club, GenderRule, Race,
    RaceKind, RaceRegistration, Raid, Role, Team, TeamRegistration, TimeWindow, User,
};
use raid_common::{RaidError, Result};
use serde_json::{json, Map, Value};

// --- field helpers ---

fn missing(key: &str) -> RaidError {
    RaidError::Mapping(format!("required field {:?} missing or malformed", key))
}

fn req_i64(v: &Value, key: &str) -> Result<i64> {
    v.get(key).and_then(Value::as_i64).ok_or_else(|| missing(key))
}

fn req_u32(v: &Value, key: &str) -> Result<u32> {
    v.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| missing(key))
}

fn req_str(v: &Value, key: &str) -> Result<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(key))
}

fn req_dt(v: &Value, key: &str) -> Result<DateTime<Utc>> {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| missing(key))
}

fn req_date(v: &Value, key: &str) -> Result<NaiveDate> {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| missing(key))
}

fn opt_str(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opt_i64(v: &Value, key: &str) -> Option<i64> {
    v.get(key).and_then(Value::as_i64)
}

fn opt_bool(v: &Value, key: &str) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn opt_dt(v: &Value, key: &str) -> Option<DateTime<Utc>> {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn opt_date(v: &Value, key: &str) -> Option<NaiveDate> {
    v.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

/// Relation reference: either a nested object carrying an `id`, or a flat
/// foreign-key field. Both are valid wire shapes for the same relation.
fn rel_id(v: &Value, nested: &str, flat: &str) -> Result<i64> {
    opt_rel_id(v, nested, flat).ok_or_else(|| missing(flat))
}

fn opt_rel_id(v: &Value, nested: &str, flat: &str) -> Option<i64> {
    if let Some(obj) = v.get(nested) {
        if let Some(id) = obj.get("id").and_then(Value::as_i64) {
            return Some(id);
        }
    }
    v.get(flat).and_then(Value::as_i64)
}

fn array(v: &Value) -> Result<&Vec<Value>> {
    v.as_array()
        .ok_or_else(|| RaidError::Mapping("expected a JSON array".to_string()))
}

fn skip_null(map: &mut Map<String, Value>) {
    map.retain(|_, value| !value.is_null());
}

// --- addresses ---

pub fn address_from_wire(v: &Value) -> Result<Address> {
    Ok(Address {
        id: req_i64(v, "id")?,
        postal_code: req_str(v, "postalCode")?,
        city: req_str(v, "city")?,
        street: req_str(v, "street")?,
        number: req_str(v, "number")?,
    })
}

pub fn address_to_wire(address: &Address) -> Value {
    json!({
        "id": address.id,
        "postalCode": address.postal_code,
        "city": address.city,
        "street": address.street,
        "number": address.number,
    })
}

// --- users ---

pub fn user_from_wire(v: &Value) -> Result<User> {
    let roles = v
        .get("roles")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .filter_map(Role::from_tag)
                .collect()
        })
        .unwrap_or_default();
    Ok(User {
        id: req_i64(v, "id")?,
        address_id: rel_id(v, "address", "addressId")?,
        club_id: opt_rel_id(v, "club", "clubId"),
        email: req_str(v, "email")?,
        name: req_str(v, "name")?,
        licence: opt_str(v, "licence"),
        phone: opt_str(v, "phone"),
        birth_date: opt_date(v, "birthDate"),
        member_since: req_date(v, "memberSince")?,
        roles,
    })
}

pub fn user_to_wire(user: &User) -> Value {
    let mut map = json!({
        "id": user.id,
        "addressId": user.address_id,
        "clubId": user.club_id,
        "email": user.email,
        "name": user.name,
        "licence": user.licence,
        "phone": user.phone,
        "birthDate": user.birth_date.map(|d| d.to_string()),
        "memberSince": user.member_since.to_string(),
        "roles": user.roles.iter().map(|r| r.as_tag()).collect::<Vec<_>>(),
    });
    skip_null(map.as_object_mut().expect("object literal"));
    map
}

pub fn users_from_wire(v: &Value) -> Result<Vec<User>> {
    array(v)?.iter().map(user_from_wire).collect()
}

// --- clubs ---

pub fn club_from_wire(v: &Value) -> Result<Club> {
    Ok(Club {
        id: req_i64(v, "id")?,
        responsible_id: rel_id(v, "responsible", "responsibleId")?,
        address_id: rel_id(v, "address", "addressId")?,
        name: req_str(v, "name")?,
    })
}

pub fn club_to_wire(club: &Club) -> Value {
    json!({
        "id": club.id,
        "responsibleId": club.responsible_id,
        "addressId": club.address_id,
        "name": club.name,
    })
}

pub fn clubs_from_wire(v: &Value) -> Result<Vec<Club>> {
    array(v)?.iter().map(club_from_wire).collect()
}

// --- raids ---

pub fn raid_from_wire(v: &Value) -> Result<Raid> {
    Ok(Raid {
        id: req_i64(v, "id")?,
        club_id: rel_id(v, "club", "clubId")?,
        address_id: rel_id(v, "address", "addressId")?,
        manager_id: rel_id(v, "manager", "managerId")?,
        name: req_str(v, "name")?,
        contact_email: opt_str(v, "contactEmail"),
        contact_phone: opt_str(v, "contactPhone"),
        window: TimeWindow {
            begin: req_dt(v, "dateBegin")?,
            end: req_dt(v, "dateEnd")?,
        },
        registration: TimeWindow {
            begin: req_dt(v, "registrationBegin")?,
            end: req_dt(v, "registrationEnd")?,
        },
        nb_races: req_u32(v, "nbRaces")?,
    })
}

pub fn raid_to_wire(raid: &Raid) -> Value {
    let mut map = json!({
        "id": raid.id,
        "clubId": raid.club_id,
        "addressId": raid.address_id,
        "managerId": raid.manager_id,
        "name": raid.name,
        "contactEmail": raid.contact_email,
        "contactPhone": raid.contact_phone,
        "dateBegin": raid.window.begin.to_rfc3339(),
        "dateEnd": raid.window.end.to_rfc3339(),
        "registrationBegin": raid.registration.begin.to_rfc3339(),
        "registrationEnd": raid.registration.end.to_rfc3339(),
        "nbRaces": raid.nb_races,
    });
    skip_null(map.as_object_mut().expect("object literal"));
    map
}

pub fn raids_from_wire(v: &Value) -> Result<Vec<Raid>> {
    array(v)?.iter().map(raid_from_wire).collect()
}

// --- races ---

pub fn race_from_wire(v: &Value) -> Result<Race> {
    let kind = req_str(v, "type")?;
    Ok(Race {
        id: req_i64(v, "id")?,
        raid_id: rel_id(v, "raid", "raidId")?,
        manager_id: rel_id(v, "manager", "managerId")?,
        name: req_str(v, "name")?,
        window: TimeWindow {
            begin: req_dt(v, "dateBegin")?,
            end: req_dt(v, "dateEnd")?,
        },
        kind: RaceKind::from_tag(&kind)
            .ok_or_else(|| RaidError::Mapping(format!("unknown race type {:?}", kind)))?,
        difficulty: req_str(v, "difficulty")?,
        participants: Bounds {
            min: req_u32(v, "participantsMin")?,
            max: req_u32(v, "participantsMax")?,
        },
        teams: Bounds {
            min: req_u32(v, "teamsMin")?,
            max: req_u32(v, "teamsMax")?,
        },
        team_size: Bounds {
            min: req_u32(v, "teamSizeMin")?,
            max: req_u32(v, "teamSizeMax")?,
        },
        brackets: AgeBrackets {
            a: req_u32(v, "ageA")?,
            b: req_u32(v, "ageB")?,
            c: req_u32(v, "ageC")?,
        },
        gender: opt_str(v, "gender")
            .and_then(|tag| GenderRule::from_tag(&tag))
            .unwrap_or(GenderRule::Any),
        chip_mandatory: opt_bool(v, "chipMandatory"),
    })
}

pub fn race_to_wire(race: &Race) -> Value {
    json!({
        "id": race.id,
        "raidId": race.raid_id,
        "managerId": race.manager_id,
        "name": race.name,
        "dateBegin": race.window.begin.to_rfc3339(),
        "dateEnd": race.window.end.to_rfc3339(),
        "type": race.kind.as_tag(),
        "difficulty": race.difficulty,
        "participantsMin": race.participants.min,
        "participantsMax": race.participants.max,
        "teamsMin": race.teams.min,
        "teamsMax": race.teams.max,
        "teamSizeMin": race.team_size.min,
        "teamSizeMax": race.team_size.max,
        "ageA": race.brackets.a,
        "ageB": race.brackets.b,
        "ageC": race.brackets.c,
        "gender": race.gender.as_tag(),
        "chipMandatory": race.chip_mandatory,
    })
}

pub fn races_from_wire(v: &Value) -> Result<Vec<Race>> {
    array(v)?.iter().map(race_from_wire).collect()
}

// --- category prices ---

pub fn price_from_wire(v: &Value) -> Result<CategoryPrice> {
    let category = req_str(v, "category")?;
    Ok(CategoryPrice {
        race_id: rel_id(v, "race", "raceId")?,
        category: Category::from_tag(&category)
            .ok_or_else(|| RaidError::Mapping(format!("unknown category {:?}", category)))?,
        price: v
            .get("price")
            .and_then(Value::as_f64)
            .ok_or_else(|| missing("price"))?,
    })
}

pub fn price_to_wire(price: &CategoryPrice) -> Value {
    json!({
        "raceId": price.race_id,
        "category": price.category.as_tag(),
        "price": price.price,
    })
}

pub fn prices_from_wire(v: &Value) -> Result<Vec<CategoryPrice>> {
    array(v)?.iter().map(price_from_wire).collect()
}

// --- teams ---

pub fn team_from_wire(v: &Value) -> Result<Team> {
    Ok(Team {
        id: req_i64(v, "id")?,
        manager_id: rel_id(v, "manager", "managerId")?,
        name: req_str(v, "name")?,
        image: opt_str(v, "image"),
    })
}

pub fn team_to_wire(team: &Team) -> Value {
    let mut map = json!({
        "id": team.id,
        "managerId": team.manager_id,
        "name": team.name,
        "image": team.image,
    });
    skip_null(map.as_object_mut().expect("object literal"));
    map
}

pub fn teams_from_wire(v: &Value) -> Result<Vec<Team>> {
    array(v)?.iter().map(team_from_wire).collect()
}

/// Member user ids embedded in a team response, as plain ids or nested
/// user objects. Absent means the response did not include the roster.
pub fn team_members_from_wire(v: &Value) -> Vec<i64> {
    v.get("members")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.as_i64().or_else(|| m.get("id").and_then(Value::as_i64)))
                .collect()
        })
        .unwrap_or_default()
}

// --- team registrations ---

pub fn team_registration_from_wire(v: &Value) -> Result<TeamRegistration> {
    Ok(TeamRegistration {
        team_id: rel_id(v, "team", "teamId")?,
        race_id: rel_id(v, "race", "raceId")?,
        validated: opt_bool(v, "validated"),
        finish_time: opt_dt(v, "finishTime"),
        // The backend predates the English field name
        bib: opt_i64(v, "bib").or_else(|| opt_i64(v, "dossard")),
    })
}

pub fn team_registration_to_wire(registration: &TeamRegistration) -> Value {
    let mut map = json!({
        "teamId": registration.team_id,
        "raceId": registration.race_id,
        "validated": registration.validated,
        "finishTime": registration.finish_time.map(|t| t.to_rfc3339()),
        "bib": registration.bib,
    });
    skip_null(map.as_object_mut().expect("object literal"));
    map
}

pub fn team_registrations_from_wire(v: &Value) -> Result<Vec<TeamRegistration>> {
    array(v)?.iter().map(team_registration_from_wire).collect()
}

// --- runner registrations ---

pub fn race_registration_from_wire(v: &Value) -> Result<RaceRegistration> {
    Ok(RaceRegistration {
        user_id: rel_id(v, "user", "userId")?,
        race_id: rel_id(v, "race", "raceId")?,
        chip_number: opt_i64(v, "chipNumber"),
        finish_time: opt_dt(v, "finishTime"),
        pps_document: opt_str(v, "ppsDocument"),
    })
}

pub fn race_registration_to_wire(registration: &RaceRegistration) -> Value {
    let mut map = json!({
        "userId": registration.user_id,
        "raceId": registration.race_id,
        "chipNumber": registration.chip_number,
        "finishTime": registration.finish_time.map(|t| t.to_rfc3339()),
        "ppsDocument": registration.pps_document,
    });
    skip_null(map.as_object_mut().expect("object literal"));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn dt(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn full_raid() -> Raid {
        Raid {
            id: 4,
            club_id: 2,
            address_id: 9,
            manager_id: 7,
            name: "Raid des Volcans".into(),
            contact_email: Some("orga@volcans.fr".into()),
            contact_phone: Some("+33 4 73 00 00 00".into()),
            window: TimeWindow {
                begin: dt("2026-06-06 07:00"),
                end: dt("2026-06-07 19:00"),
            },
            registration: TimeWindow {
                begin: dt("2026-04-01 00:00"),
                end: dt("2026-05-31 23:59"),
            },
            nb_races: 4,
        }
    }

    fn full_race() -> Race {
        Race {
            id: 11,
            raid_id: 4,
            manager_id: 7,
            name: "Nocturne".into(),
            window: TimeWindow {
                begin: dt("2026-06-06 21:00"),
                end: dt("2026-06-07 02:00"),
            },
            kind: RaceKind::Competitive,
            difficulty: "expert".into(),
            participants: Bounds { min: 4, max: 90 },
            teams: Bounds { min: 2, max: 30 },
            team_size: Bounds { min: 2, max: 3 },
            brackets: AgeBrackets { a: 8, b: 15, c: 18 },
            gender: GenderRule::Mixed,
            chip_mandatory: true,
        }
    }

    #[test]
    fn raid_round_trips_full_instance() {
        let raid = full_raid();
        assert_eq!(raid_from_wire(&raid_to_wire(&raid)).unwrap(), raid);
    }

    #[test]
    fn raid_round_trips_minimal_instance() {
        let raid = Raid {
            contact_email: None,
            contact_phone: None,
            ..full_raid()
        };
        assert_eq!(raid_from_wire(&raid_to_wire(&raid)).unwrap(), raid);
    }

    #[test]
    fn raid_accepts_nested_relation_objects() {
        let wire = json!({
            "id": 4,
            "club": {"id": 2, "name": "CO Clermont"},
            "address": {"id": 9, "city": "Clermont"},
            "manager": {"id": 7, "name": "Zoe"},
            "name": "Raid des Volcans",
            "dateBegin": "2026-06-06T07:00:00+00:00",
            "dateEnd": "2026-06-07T19:00:00+00:00",
            "registrationBegin": "2026-04-01T00:00:00+00:00",
            "registrationEnd": "2026-05-31T23:59:00+00:00",
            "nbRaces": 4,
        });
        let raid = raid_from_wire(&wire).unwrap();
        assert_eq!(raid.club_id, 2);
        assert_eq!(raid.address_id, 9);
        assert_eq!(raid.manager_id, 7);
    }

    #[test]
    fn race_round_trips_both_ways() {
        let race = full_race();
        assert_eq!(race_from_wire(&race_to_wire(&race)).unwrap(), race);
    }

    #[test]
    fn user_round_trips_with_and_without_optionals() {
        let full = User {
            id: 3,
            address_id: 9,
            club_id: Some(2),
            email: "zoe@example.org".into(),
            name: "Zoe".into(),
            licence: Some("FR-991".into()),
            phone: Some("+33 6 00 00 00 00".into()),
            birth_date: Some(NaiveDate::from_ymd_opt(1999, 12, 1).unwrap()),
            member_since: NaiveDate::from_ymd_opt(2021, 9, 1).unwrap(),
            roles: vec![Role::Runner, Role::RaidManager],
        };
        assert_eq!(user_from_wire(&user_to_wire(&full)).unwrap(), full);

        let minimal = User {
            club_id: None,
            licence: None,
            phone: None,
            birth_date: None,
            roles: vec![],
            ..full
        };
        assert_eq!(user_from_wire(&user_to_wire(&minimal)).unwrap(), minimal);
    }

    #[test]
    fn missing_id_is_a_mapping_error() {
        let wire = json!({"postalCode": "63000", "city": "Clermont", "street": "Rue A", "number": "1"});
        assert!(matches!(
            address_from_wire(&wire),
            Err(RaidError::Mapping(_))
        ));
    }

    #[test]
    fn malformed_optionals_degrade_to_absent() {
        let wire = json!({
            "id": 3,
            "addressId": 9,
            "email": "zoe@example.org",
            "name": "Zoe",
            "birthDate": "not-a-date",
            "phone": 12345,
            "memberSince": "2021-09-01",
        });
        let user = user_from_wire(&wire).unwrap();
        assert_eq!(user.birth_date, None);
        assert_eq!(user.phone, None);
        assert_eq!(user.club_id, None);
    }

    #[test]
    fn unknown_role_tags_are_skipped() {
        let wire = json!({
            "id": 3,
            "addressId": 9,
            "email": "zoe@example.org",
            "name": "Zoe",
            "memberSince": "2021-09-01",
            "roles": ["runner", "referee"],
        });
        let user = user_from_wire(&wire).unwrap();
        assert_eq!(user.roles, vec![Role::Runner]);
    }

    #[test]
    fn bib_accepts_the_legacy_field_name() {
        let wire = json!({"teamId": 1, "raceId": 2, "dossard": 42});
        let reg = team_registration_from_wire(&wire).unwrap();
        assert_eq!(reg.bib, Some(42));
    }

    #[test]
    fn team_members_accept_ids_or_objects() {
        let wire = json!({"id": 1, "managerId": 5, "name": "Foxes",
                          "members": [5, {"id": 6, "name": "Ana"}]});
        assert_eq!(team_members_from_wire(&wire), vec![5, 6]);
    }

    #[test]
    fn price_and_registration_round_trip() {
        let price = CategoryPrice {
            race_id: 11,
            category: Category::Licensed,
            price: 8.5,
        };
        assert_eq!(price_from_wire(&price_to_wire(&price)).unwrap(), price);

        let reg = RaceRegistration {
            user_id: 3,
            race_id: 11,
            chip_number: Some(777),
            finish_time: None,
            pps_document: Some("pps-2026.pdf".into()),
        };
        assert_eq!(
            race_registration_from_wire(&race_registration_to_wire(&reg)).unwrap(),
            reg
        );
    }
}
