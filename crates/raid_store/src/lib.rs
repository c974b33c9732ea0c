//! SQLite-backed local store for the Raidlink sync core
//!
//! Holds the offline cache of every entity kind plus the durable outbound
//! queue. Entity rows use replace-on-conflict with the entity id as the
//! merge key, so a reconcile pass is a scoped clear followed by inserts.
//!
//! The store is constructed explicitly and handed to the coordinator by
//! dependency injection; there is no module-level connection.

use chrono::{DateTime, NaiveDate, Utc};
use raid_common::entities::{
    Address, Category, Club, OutboundAction, OutboundEntry, Race, RaceRegistration, Raid, Role,
    Team, TeamRegistration, TimeWindow, User,
};
use raid_common::entities::{AgeBrackets, Bounds, CategoryPrice, GenderRule, RaceKind};
use raid_common::Result;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;

/// Local cache plus outbound queue over a single SQLite connection
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the cache database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path))
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(include_str!("schema.sql"))?;
        if let Some(path) = path {
            tracing::info!("cache database opened at {:?}", path);
        }
        Ok(Self { conn })
    }

    // --- addresses ---

    pub fn upsert_address(&self, address: &Address) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO addresses (id, postal_code, city, street, number)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                address.id,
                address.postal_code,
                address.city,
                address.street,
                address.number
            ],
        )?;
        Ok(())
    }

    pub fn get_address(&self, id: i64) -> Result<Option<Address>> {
        self.optional_row(
            "SELECT id, postal_code, city, street, number FROM addresses WHERE id = ?1",
            id,
            address_from_row,
        )
    }

    pub fn delete_address(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM addresses WHERE id = ?1", [id])?;
        Ok(())
    }

    // --- users ---

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let roles = user
            .roles
            .iter()
            .map(Role::as_tag)
            .collect::<Vec<_>>()
            .join(",");
        self.conn.execute(
            "INSERT OR REPLACE INTO users
                 (id, address_id, club_id, email, name, licence, phone,
                  birth_date, member_since, roles)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id,
                user.address_id,
                user.club_id,
                user.email,
                user.name,
                user.licence,
                user.phone,
                user.birth_date.map(|d| d.to_string()),
                user.member_since.to_string(),
                roles
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.optional_row(
            "SELECT id, address_id, club_id, email, name, licence, phone,
                    birth_date, member_since, roles
             FROM users WHERE id = ?1",
            id,
            user_from_row,
        )
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, address_id, club_id, email, name, licence, phone,
                    birth_date, member_since, roles
             FROM users ORDER BY id",
        )?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn delete_user(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(())
    }

    // --- clubs ---

    pub fn upsert_club(&self, club: &Club) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO clubs (id, responsible_id, address_id, name)
             VALUES (?1, ?2, ?3, ?4)",
            params![club.id, club.responsible_id, club.address_id, club.name],
        )?;
        Ok(())
    }

    pub fn get_club(&self, id: i64) -> Result<Option<Club>> {
        self.optional_row(
            "SELECT id, responsible_id, address_id, name FROM clubs WHERE id = ?1",
            id,
            club_from_row,
        )
    }

    pub fn list_clubs(&self) -> Result<Vec<Club>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, responsible_id, address_id, name FROM clubs ORDER BY id")?;
        let clubs = stmt
            .query_map([], club_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(clubs)
    }

    pub fn clear_clubs(&self) -> Result<()> {
        self.conn.execute("DELETE FROM clubs", [])?;
        Ok(())
    }

    pub fn delete_club(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM clubs WHERE id = ?1", [id])?;
        Ok(())
    }

    // --- raids ---

    pub fn upsert_raid(&self, raid: &Raid) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO raids
                 (id, club_id, address_id, manager_id, name, contact_email,
                  contact_phone, begin_at, end_at, registration_begin,
                  registration_end, nb_races)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                raid.id,
                raid.club_id,
                raid.address_id,
                raid.manager_id,
                raid.name,
                raid.contact_email,
                raid.contact_phone,
                raid.window.begin.to_rfc3339(),
                raid.window.end.to_rfc3339(),
                raid.registration.begin.to_rfc3339(),
                raid.registration.end.to_rfc3339(),
                raid.nb_races
            ],
        )?;
        Ok(())
    }

    pub fn get_raid(&self, id: i64) -> Result<Option<Raid>> {
        self.optional_row(
            "SELECT id, club_id, address_id, manager_id, name, contact_email,
                    contact_phone, begin_at, end_at, registration_begin,
                    registration_end, nb_races
             FROM raids WHERE id = ?1",
            id,
            raid_from_row,
        )
    }

    pub fn list_raids(&self) -> Result<Vec<Raid>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, club_id, address_id, manager_id, name, contact_email,
                    contact_phone, begin_at, end_at, registration_begin,
                    registration_end, nb_races
             FROM raids ORDER BY id",
        )?;
        let raids = stmt
            .query_map([], raid_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(raids)
    }

    pub fn clear_raids(&self) -> Result<()> {
        self.conn.execute("DELETE FROM raids", [])?;
        Ok(())
    }

    pub fn delete_raid(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM raids WHERE id = ?1", [id])?;
        Ok(())
    }

    // --- races ---

    pub fn upsert_race(&self, race: &Race) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO races
                 (id, raid_id, manager_id, name, begin_at, end_at, kind,
                  difficulty, participants_min, participants_max, teams_min,
                  teams_max, team_size_min, team_size_max, bracket_a,
                  bracket_b, bracket_c, gender, chip_mandatory)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                race.id,
                race.raid_id,
                race.manager_id,
                race.name,
                race.window.begin.to_rfc3339(),
                race.window.end.to_rfc3339(),
                race.kind.as_tag(),
                race.difficulty,
                race.participants.min,
                race.participants.max,
                race.teams.min,
                race.teams.max,
                race.team_size.min,
                race.team_size.max,
                race.brackets.a,
                race.brackets.b,
                race.brackets.c,
                race.gender.as_tag(),
                race.chip_mandatory
            ],
        )?;
        Ok(())
    }

    pub fn get_race(&self, id: i64) -> Result<Option<Race>> {
        self.optional_row(
            &format!("{} WHERE id = ?1", SELECT_RACE),
            id,
            race_from_row,
        )
    }

    pub fn list_races_for_raid(&self, raid_id: i64) -> Result<Vec<Race>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE raid_id = ?1 ORDER BY id", SELECT_RACE))?;
        let races = stmt
            .query_map([raid_id], race_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(races)
    }

    pub fn clear_races_for_raid(&self, raid_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM races WHERE raid_id = ?1", [raid_id])?;
        Ok(())
    }

    pub fn count_races_for_raid(&self, raid_id: i64) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM races WHERE raid_id = ?1",
            [raid_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn delete_race(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM races WHERE id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM category_prices WHERE race_id = ?1", [id])?;
        Ok(())
    }

    // --- category prices ---

    pub fn upsert_price(&self, price: &CategoryPrice) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO category_prices (race_id, category, price)
             VALUES (?1, ?2, ?3)",
            params![price.race_id, price.category.as_tag(), price.price],
        )?;
        Ok(())
    }

    pub fn list_prices_for_race(&self, race_id: i64) -> Result<Vec<CategoryPrice>> {
        let mut stmt = self.conn.prepare(
            "SELECT race_id, category, price FROM category_prices
             WHERE race_id = ?1 ORDER BY category",
        )?;
        let prices = stmt
            .query_map([race_id], price_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prices)
    }

    pub fn clear_prices_for_race(&self, race_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM category_prices WHERE race_id = ?1", [race_id])?;
        Ok(())
    }

    // --- teams ---

    pub fn upsert_team(&self, team: &Team) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO teams (id, manager_id, name, image)
             VALUES (?1, ?2, ?3, ?4)",
            params![team.id, team.manager_id, team.name, team.image],
        )?;
        Ok(())
    }

    pub fn get_team(&self, id: i64) -> Result<Option<Team>> {
        self.optional_row(
            "SELECT id, manager_id, name, image FROM teams WHERE id = ?1",
            id,
            team_from_row,
        )
    }

    pub fn delete_team(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM teams WHERE id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM team_members WHERE team_id = ?1", [id])?;
        self.conn
            .execute("DELETE FROM team_registrations WHERE team_id = ?1", [id])?;
        Ok(())
    }

    pub fn add_team_member(&self, team_id: i64, user_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO team_members (team_id, user_id) VALUES (?1, ?2)",
            params![team_id, user_id],
        )?;
        Ok(())
    }

    pub fn list_team_members(&self, team_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM team_members WHERE team_id = ?1 ORDER BY user_id")?;
        let ids = stmt
            .query_map([team_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // --- team registrations ---

    pub fn upsert_team_registration(&self, registration: &TeamRegistration) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO team_registrations
                 (team_id, race_id, validated, finish_time, bib)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                registration.team_id,
                registration.race_id,
                registration.validated,
                registration.finish_time.map(|t| t.to_rfc3339()),
                registration.bib
            ],
        )?;
        Ok(())
    }

    pub fn list_team_registrations_for_race(&self, race_id: i64) -> Result<Vec<TeamRegistration>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, race_id, validated, finish_time, bib
             FROM team_registrations WHERE race_id = ?1 ORDER BY team_id",
        )?;
        let regs = stmt
            .query_map([race_id], team_registration_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(regs)
    }

    pub fn clear_team_registrations_for_race(&self, race_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM team_registrations WHERE race_id = ?1",
            [race_id],
        )?;
        Ok(())
    }

    /// Teams holding a registration for the given race
    pub fn list_teams_for_race(&self, race_id: i64) -> Result<Vec<Team>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.manager_id, t.name, t.image
             FROM teams t
             JOIN team_registrations tr ON tr.team_id = t.id
             WHERE tr.race_id = ?1 ORDER BY t.id",
        )?;
        let teams = stmt
            .query_map([race_id], team_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    /// Users who already belong to a team registered for the given race
    pub fn users_in_teams_for_race(&self, race_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT tm.user_id
             FROM team_members tm
             JOIN team_registrations tr ON tr.team_id = tm.team_id
             WHERE tr.race_id = ?1",
        )?;
        let ids = stmt
            .query_map([race_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // --- runner registrations ---

    pub fn upsert_race_registration(&self, registration: &RaceRegistration) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO race_registrations
                 (user_id, race_id, chip_number, finish_time, pps_document)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                registration.user_id,
                registration.race_id,
                registration.chip_number,
                registration.finish_time.map(|t| t.to_rfc3339()),
                registration.pps_document
            ],
        )?;
        Ok(())
    }

    pub fn list_registrations_for_race(&self, race_id: i64) -> Result<Vec<RaceRegistration>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, race_id, chip_number, finish_time, pps_document
             FROM race_registrations WHERE race_id = ?1 ORDER BY user_id",
        )?;
        let regs = stmt
            .query_map([race_id], race_registration_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(regs)
    }

    /// Races the user is committed to, either individually or through a
    /// team registration. Used for schedule-overlap checks.
    pub fn races_for_user(&self, user_id: i64) -> Result<Vec<Race>> {
        let sql = format!(
            "{} WHERE id IN (
                 SELECT race_id FROM race_registrations WHERE user_id = ?1
                 UNION
                 SELECT tr.race_id FROM team_registrations tr
                 JOIN team_members tm ON tm.team_id = tr.team_id
                 WHERE tm.user_id = ?1
             ) ORDER BY id",
            SELECT_RACE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let races = stmt
            .query_map([user_id], race_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(races)
    }

    // --- outbound queue ---

    pub fn enqueue_outbound(
        &self,
        action: OutboundAction,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let created_at = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO outbound_queue (action, payload, created_at) VALUES (?1, ?2, ?3)",
            params![action.as_tag(), payload.to_string(), created_at],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(action = action.as_tag(), id, "queued outbound write");
        Ok(id)
    }

    pub fn dequeue_outbound(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM outbound_queue WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Pending entries in FIFO order by creation timestamp
    pub fn list_pending_outbound(&self) -> Result<Vec<OutboundEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, payload, created_at
             FROM outbound_queue ORDER BY created_at, id",
        )?;
        let entries = stmt
            .query_map([], outbound_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- helpers ---

    fn optional_row<T>(
        &self,
        sql: &str,
        id: i64,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(map(row)?)),
            None => Ok(None),
        }
    }
}

const SELECT_RACE: &str = "SELECT id, raid_id, manager_id, name, begin_at, end_at, kind,
        difficulty, participants_min, participants_max, teams_min, teams_max,
        team_size_min, team_size_max, bracket_a, bracket_b, bracket_c,
        gender, chip_mandatory
 FROM races";

// Row mappers: the local-row half of the entity mapper. Column order
// matches the SELECT lists above.

fn parse_dt(idx: usize, text: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date(idx: usize, text: String) -> rusqlite::Result<NaiveDate> {
    text.parse::<NaiveDate>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_dt(idx: usize, text: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    text.map(|t| parse_dt(idx, t)).transpose()
}

fn address_from_row(row: &Row<'_>) -> rusqlite::Result<Address> {
    Ok(Address {
        id: row.get(0)?,
        postal_code: row.get(1)?,
        city: row.get(2)?,
        street: row.get(3)?,
        number: row.get(4)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let birth_date: Option<String> = row.get(7)?;
    let roles: String = row.get(9)?;
    Ok(User {
        id: row.get(0)?,
        address_id: row.get(1)?,
        club_id: row.get(2)?,
        email: row.get(3)?,
        name: row.get(4)?,
        licence: row.get(5)?,
        phone: row.get(6)?,
        // Unparseable optional dates degrade to absent
        birth_date: birth_date.and_then(|d| d.parse().ok()),
        member_since: parse_date(8, row.get(8)?)?,
        roles: roles
            .split(',')
            .filter(|tag| !tag.is_empty())
            .filter_map(Role::from_tag)
            .collect(),
    })
}

fn club_from_row(row: &Row<'_>) -> rusqlite::Result<Club> {
    Ok(Club {
        id: row.get(0)?,
        responsible_id: row.get(1)?,
        address_id: row.get(2)?,
        name: row.get(3)?,
    })
}

fn raid_from_row(row: &Row<'_>) -> rusqlite::Result<Raid> {
    Ok(Raid {
        id: row.get(0)?,
        club_id: row.get(1)?,
        address_id: row.get(2)?,
        manager_id: row.get(3)?,
        name: row.get(4)?,
        contact_email: row.get(5)?,
        contact_phone: row.get(6)?,
        window: TimeWindow {
            begin: parse_dt(7, row.get(7)?)?,
            end: parse_dt(8, row.get(8)?)?,
        },
        registration: TimeWindow {
            begin: parse_dt(9, row.get(9)?)?,
            end: parse_dt(10, row.get(10)?)?,
        },
        nb_races: row.get(11)?,
    })
}

fn race_from_row(row: &Row<'_>) -> rusqlite::Result<Race> {
    let kind: String = row.get(6)?;
    let gender: String = row.get(17)?;
    Ok(Race {
        id: row.get(0)?,
        raid_id: row.get(1)?,
        manager_id: row.get(2)?,
        name: row.get(3)?,
        window: TimeWindow {
            begin: parse_dt(4, row.get(4)?)?,
            end: parse_dt(5, row.get(5)?)?,
        },
        kind: RaceKind::from_tag(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                Type::Text,
                format!("unknown race kind {:?}", kind).into(),
            )
        })?,
        difficulty: row.get(7)?,
        participants: Bounds {
            min: row.get(8)?,
            max: row.get(9)?,
        },
        teams: Bounds {
            min: row.get(10)?,
            max: row.get(11)?,
        },
        team_size: Bounds {
            min: row.get(12)?,
            max: row.get(13)?,
        },
        brackets: AgeBrackets {
            a: row.get(14)?,
            b: row.get(15)?,
            c: row.get(16)?,
        },
        gender: GenderRule::from_tag(&gender).unwrap_or(GenderRule::Any),
        chip_mandatory: row.get(18)?,
    })
}

fn price_from_row(row: &Row<'_>) -> rusqlite::Result<CategoryPrice> {
    let category: String = row.get(1)?;
    Ok(CategoryPrice {
        race_id: row.get(0)?,
        category: Category::from_tag(&category).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("unknown category {:?}", category).into(),
            )
        })?,
        price: row.get(2)?,
    })
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        manager_id: row.get(1)?,
        name: row.get(2)?,
        image: row.get(3)?,
    })
}

fn team_registration_from_row(row: &Row<'_>) -> rusqlite::Result<TeamRegistration> {
    Ok(TeamRegistration {
        team_id: row.get(0)?,
        race_id: row.get(1)?,
        validated: row.get(2)?,
        finish_time: parse_opt_dt(3, row.get(3)?)?,
        bib: row.get(4)?,
    })
}

fn race_registration_from_row(row: &Row<'_>) -> rusqlite::Result<RaceRegistration> {
    Ok(RaceRegistration {
        user_id: row.get(0)?,
        race_id: row.get(1)?,
        chip_number: row.get(2)?,
        finish_time: parse_opt_dt(3, row.get(3)?)?,
        pps_document: row.get(4)?,
    })
}

fn outbound_from_row(row: &Row<'_>) -> rusqlite::Result<OutboundEntry> {
    let action: String = row.get(1)?;
    let payload: String = row.get(2)?;
    Ok(OutboundEntry {
        id: row.get(0)?,
        action: OutboundAction::from_tag(&action).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("unknown outbound action {:?}", action).into(),
            )
        })?,
        payload: serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
        })?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use serde_json::json;

    fn dt(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn sample_race(id: i64, raid_id: i64) -> Race {
        Race {
            id,
            raid_id,
            manager_id: 7,
            name: format!("Race {}", id),
            window: TimeWindow {
                begin: dt("2026-05-01 08:00"),
                end: dt("2026-05-01 16:00"),
            },
            kind: RaceKind::Competitive,
            difficulty: "hard".into(),
            participants: Bounds { min: 2, max: 120 },
            teams: Bounds { min: 1, max: 40 },
            team_size: Bounds { min: 2, max: 3 },
            brackets: AgeBrackets { a: 8, b: 15, c: 18 },
            gender: GenderRule::Any,
            chip_mandatory: true,
        }
    }

    #[test]
    fn race_upsert_replaces_on_id() {
        let store = Store::open_in_memory().unwrap();
        let mut race = sample_race(1, 10);
        store.upsert_race(&race).unwrap();

        race.name = "Renamed".into();
        store.upsert_race(&race).unwrap();

        let races = store.list_races_for_raid(10).unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].name, "Renamed");
    }

    #[test]
    fn race_round_trips_through_rows() {
        let store = Store::open_in_memory().unwrap();
        let race = sample_race(3, 10);
        store.upsert_race(&race).unwrap();
        assert_eq!(store.get_race(3).unwrap().unwrap(), race);
    }

    #[test]
    fn scope_clear_only_touches_one_raid() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_race(&sample_race(1, 10)).unwrap();
        store.upsert_race(&sample_race(2, 10)).unwrap();
        store.upsert_race(&sample_race(3, 11)).unwrap();

        store.clear_races_for_raid(10).unwrap();

        assert_eq!(store.count_races_for_raid(10).unwrap(), 0);
        assert_eq!(store.count_races_for_raid(11).unwrap(), 1);
    }

    #[test]
    fn user_roles_survive_storage() {
        let store = Store::open_in_memory().unwrap();
        let user = User {
            id: 5,
            address_id: 1,
            club_id: Some(2),
            email: "chief@example.org".into(),
            name: "Chief".into(),
            licence: Some("L-123".into()),
            phone: None,
            birth_date: Some(NaiveDate::from_ymd_opt(1990, 3, 2).unwrap()),
            member_since: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            roles: vec![Role::Runner, Role::ClubManager],
        };
        store.upsert_user(&user).unwrap();
        assert_eq!(store.get_user(5).unwrap().unwrap(), user);
    }

    #[test]
    fn outbound_queue_is_fifo_by_creation() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .enqueue_outbound(OutboundAction::CreateTeam, &json!({"name": "A"}))
            .unwrap();
        let b = store
            .enqueue_outbound(OutboundAction::AddTeamMember, &json!({"teamId": 1}))
            .unwrap();

        let pending = store.list_pending_outbound().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, a);
        assert_eq!(pending[1].id, b);
        assert_eq!(pending[0].action, OutboundAction::CreateTeam);

        store.dequeue_outbound(a).unwrap();
        let pending = store.list_pending_outbound().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);
    }

    #[test]
    fn team_membership_joins_to_race_roster() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_team(&Team {
                id: 1,
                manager_id: 5,
                name: "Foxes".into(),
                image: None,
            })
            .unwrap();
        store.add_team_member(1, 5).unwrap();
        store.add_team_member(1, 6).unwrap();
        store
            .upsert_team_registration(&TeamRegistration {
                team_id: 1,
                race_id: 9,
                validated: false,
                finish_time: None,
                bib: None,
            })
            .unwrap();

        assert_eq!(store.users_in_teams_for_race(9).unwrap(), vec![5, 6]);
        assert_eq!(store.list_teams_for_race(9).unwrap().len(), 1);
    }

    #[test]
    fn races_for_user_unions_both_registration_paths() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_race(&sample_race(1, 10)).unwrap();
        store.upsert_race(&sample_race(2, 10)).unwrap();

        // Individual registration to race 1
        store
            .upsert_race_registration(&RaceRegistration {
                user_id: 42,
                race_id: 1,
                chip_number: None,
                finish_time: None,
                pps_document: Some("pps.pdf".into()),
            })
            .unwrap();

        // Team-based registration to race 2
        store
            .upsert_team(&Team {
                id: 8,
                manager_id: 42,
                name: "Owls".into(),
                image: None,
            })
            .unwrap();
        store.add_team_member(8, 42).unwrap();
        store
            .upsert_team_registration(&TeamRegistration {
                team_id: 8,
                race_id: 2,
                validated: true,
                finish_time: None,
                bib: Some(17),
            })
            .unwrap();

        let races = store.races_for_user(42).unwrap();
        let ids: Vec<i64> = races.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn deleting_a_team_removes_roster_and_registrations() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_team(&Team {
                id: 5,
                manager_id: 1,
                name: "Foxes".into(),
                image: None,
            })
            .unwrap();
        store.add_team_member(5, 11).unwrap();
        store
            .upsert_team_registration(&TeamRegistration {
                team_id: 5,
                race_id: 1,
                validated: false,
                finish_time: None,
                bib: None,
            })
            .unwrap();

        store.delete_team(5).unwrap();

        assert!(store.list_team_members(5).unwrap().is_empty());
        assert!(store
            .list_team_registrations_for_race(1)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rows_survive_reopening_the_database() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("cache.db");

        {
            let store = Store::open(&path).unwrap();
            store
                .upsert_club(&Club {
                    id: 3,
                    responsible_id: 1,
                    address_id: 1,
                    name: "CO Rennes".into(),
                })
                .unwrap();
        }

        let reopened = Store::open(&path).unwrap();
        let clubs = reopened.list_clubs().unwrap();
        assert_eq!(clubs.len(), 1);
        assert_eq!(clubs[0].name, "CO Rennes");
    }
}
