//! Sync coordinator orchestration
//!
//! Every operation follows one of two shapes. Reads try the remote API,
//! reconcile the cache under the scope lock (clear the scope, insert the
//! fresh rows) and fall back to cached rows on connectivity failure.
//! Writes inject the auth token, persist the authoritative server row on
//! success, and on connectivity failure write locally under a provisional
//! clock id and queue the action for replay.
//!
//! Authorization and validation failures (401/403/422) never touch the
//! local store and never enter the queue.

use crate::availability;
use crate::scopes::{Scope, ScopeLocks};
use chrono::Utc;
use raid_common::entities::{
    Address, CategoryPrice, Club, OutboundAction, OutboundEntry, Race, RaceRegistration, Raid,
    Team, TeamRegistration, User,
};
use raid_common::{Fetched, RaidError, Result, WriteAck};
use raid_remote::{AuthProvider, Method, Remote};
use raid_store::Store;
use raid_wire as wire;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Orchestrates reads and writes through the
/// try-remote / reconcile-local / fall-back-to-cache protocol
pub struct SyncCoordinator {
    store: Mutex<Store>,
    remote: Arc<dyn Remote>,
    auth: Arc<dyn AuthProvider>,
    pub(crate) scopes: ScopeLocks,
    last_provisional: AtomicI64,
}

impl SyncCoordinator {
    /// All collaborators are injected; the coordinator owns the store
    /// handle for its lifetime.
    pub fn new(store: Store, remote: Arc<dyn Remote>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            store: Mutex::new(store),
            remote,
            auth,
            scopes: ScopeLocks::default(),
            last_provisional: AtomicI64::new(0),
        }
    }

    pub(crate) fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().expect("store mutex poisoned")
    }

    pub(crate) fn remote(&self) -> &dyn Remote {
        self.remote.as_ref()
    }

    pub(crate) fn token(&self) -> Option<String> {
        self.auth.current_token()
    }

    /// Clock-derived provisional id, strictly monotonic within a session
    fn provisional_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_provisional
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(prev.max(now - 1) + 1)
            })
            .unwrap_or(now - 1);
        prev.max(now - 1) + 1
    }

    /// Pending outbound entries, FIFO
    pub fn pending_outbound(&self) -> Result<Vec<OutboundEntry>> {
        self.store().list_pending_outbound()
    }

    // --- read shape ---

    async fn read_through<T>(
        &self,
        scope: Scope,
        path: String,
        reconcile: impl FnOnce(&Store, &Value) -> Result<Vec<T>>,
        fallback: impl FnOnce(&Store) -> Result<Vec<T>>,
    ) -> Result<Fetched<Vec<T>>> {
        let _guard = self.scopes.hold(scope).await;
        match self.remote.request(Method::Get, &path, None, None).await {
            Ok(body) => {
                let store = self.store();
                Ok(Fetched::fresh(reconcile(&store, &body)?))
            }
            // Absent on the server means absent locally too
            Err(RaidError::NotFound) => {
                let store = self.store();
                Ok(Fetched::fresh(reconcile(&store, &Value::Array(vec![]))?))
            }
            Err(e) if e.is_connectivity() => {
                tracing::warn!(path = %path, error = %e, "remote unreachable, serving cache");
                let store = self.store();
                Ok(Fetched::cached(fallback(&store)?))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn fetch_raids(&self) -> Result<Fetched<Vec<Raid>>> {
        self.read_through(
            Scope::Raids,
            "raids".to_string(),
            |store, body| {
                let raids = wire::raids_from_wire(body)?;
                store.clear_raids()?;
                for raid in &raids {
                    store.upsert_raid(raid)?;
                }
                Ok(raids)
            },
            |store| store.list_raids(),
        )
        .await
    }

    pub async fn fetch_races_for_raid(&self, raid_id: i64) -> Result<Fetched<Vec<Race>>> {
        self.read_through(
            Scope::RacesOf(raid_id),
            format!("raids/{raid_id}/races"),
            move |store, body| {
                let races = wire::races_from_wire(body)?;
                store.clear_races_for_raid(raid_id)?;
                for race in &races {
                    store.upsert_race(race)?;
                }
                Ok(races)
            },
            move |store| store.list_races_for_raid(raid_id),
        )
        .await
    }

    pub async fn fetch_clubs(&self) -> Result<Fetched<Vec<Club>>> {
        self.read_through(
            Scope::Clubs,
            "clubs".to_string(),
            |store, body| {
                let clubs = wire::clubs_from_wire(body)?;
                store.clear_clubs()?;
                for club in &clubs {
                    store.upsert_club(club)?;
                }
                Ok(clubs)
            },
            |store| store.list_clubs(),
        )
        .await
    }

    pub async fn fetch_users(&self) -> Result<Fetched<Vec<User>>> {
        self.read_through(
            Scope::Users,
            "users".to_string(),
            |store, body| {
                let users = wire::users_from_wire(body)?;
                // Users are never hard-deleted; plain upsert suffices
                for user in &users {
                    store.upsert_user(user)?;
                }
                Ok(users)
            },
            |store| store.list_users(),
        )
        .await
    }

    pub async fn fetch_prices_for_race(&self, race_id: i64) -> Result<Fetched<Vec<CategoryPrice>>> {
        self.read_through(
            Scope::PricesOf(race_id),
            format!("races/{race_id}/prices"),
            move |store, body| {
                let prices = wire::prices_from_wire(body)?;
                store.clear_prices_for_race(race_id)?;
                for price in &prices {
                    store.upsert_price(price)?;
                }
                Ok(prices)
            },
            move |store| store.list_prices_for_race(race_id),
        )
        .await
    }

    pub async fn fetch_teams_for_race(&self, race_id: i64) -> Result<Fetched<Vec<Team>>> {
        self.read_through(
            Scope::TeamsOf(race_id),
            format!("races/{race_id}/teams"),
            move |store, body| {
                let elements = body
                    .as_array()
                    .ok_or_else(|| RaidError::Mapping("expected a JSON array".to_string()))?;
                store.clear_team_registrations_for_race(race_id)?;
                let mut teams = Vec::with_capacity(elements.len());
                for element in elements {
                    let team = wire::team_from_wire(element)?;
                    store.upsert_team(&team)?;
                    for member in wire::team_members_from_wire(element) {
                        store.add_team_member(team.id, member)?;
                    }
                    let registration = match element.get("registration") {
                        Some(r) => wire::team_registration_from_wire(r)?,
                        None => TeamRegistration {
                            team_id: team.id,
                            race_id,
                            validated: false,
                            finish_time: None,
                            bib: None,
                        },
                    };
                    store.upsert_team_registration(&registration)?;
                    teams.push(team);
                }
                Ok(teams)
            },
            move |store| store.list_teams_for_race(race_id),
        )
        .await
    }

    // --- write shape ---

    #[allow(clippy::too_many_arguments)]
    async fn write_through(
        &self,
        scope: Scope,
        method: Method,
        path: String,
        payload: Value,
        action: OutboundAction,
        precheck: impl FnOnce(&Store) -> Result<()>,
        apply_remote: impl FnOnce(&Store, &Value) -> Result<i64>,
        apply_local: impl FnOnce(&Store, i64) -> Result<i64>,
    ) -> Result<WriteAck> {
        let _guard = self.scopes.hold(scope).await;

        // Domain invariants fail fast, before any network round-trip
        {
            let store = self.store();
            precheck(&store)?;
        }

        let token = self.auth.current_token();
        match self
            .remote
            .request(method, &path, token.as_deref(), Some(payload.clone()))
            .await
        {
            Ok(body) => {
                let store = self.store();
                let id = apply_remote(&store, &body)?;
                tracing::debug!(path = %path, id, "write confirmed by remote");
                Ok(WriteAck::confirmed(id))
            }
            Err(e) if e.is_connectivity() => {
                tracing::warn!(path = %path, error = %e, "remote unreachable, queueing write");
                let provisional = self.provisional_id();
                let store = self.store();
                let id = apply_local(&store, provisional)?;
                let mut queued = payload;
                if action.is_create() {
                    if let Some(map) = queued.as_object_mut() {
                        map.insert("localId".to_string(), json!(id));
                    }
                }
                store.enqueue_outbound(action, &queued)?;
                Ok(WriteAck::pending(id))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_address(&self, address: &Address) -> Result<WriteAck> {
        let draft = address.clone();
        self.write_through(
            Scope::Addresses,
            Method::Post,
            "addresses".to_string(),
            without_id(wire::address_to_wire(address)),
            OutboundAction::CreateAddress,
            |_| Ok(()),
            |store, body| {
                let created = wire::address_from_wire(body)?;
                store.upsert_address(&created)?;
                Ok(created.id)
            },
            move |store, local_id| {
                store.upsert_address(&Address {
                    id: local_id,
                    ..draft
                })?;
                Ok(local_id)
            },
        )
        .await
    }

    pub async fn create_user(&self, user: &User) -> Result<WriteAck> {
        let draft = user.clone();
        self.write_through(
            Scope::Users,
            Method::Post,
            "users".to_string(),
            without_id(wire::user_to_wire(user)),
            OutboundAction::CreateUser,
            |_| Ok(()),
            |store, body| {
                let created = wire::user_from_wire(body)?;
                store.upsert_user(&created)?;
                Ok(created.id)
            },
            move |store, local_id| {
                store.upsert_user(&User {
                    id: local_id,
                    ..draft
                })?;
                Ok(local_id)
            },
        )
        .await
    }

    pub async fn update_user(&self, user: &User) -> Result<WriteAck> {
        let draft = user.clone();
        let fallback = user.clone();
        self.write_through(
            Scope::Users,
            Method::Put,
            format!("users/{}", user.id),
            wire::user_to_wire(user),
            OutboundAction::UpdateUser,
            |_| Ok(()),
            move |store, body| {
                let updated = if body.is_null() {
                    draft
                } else {
                    wire::user_from_wire(body)?
                };
                store.upsert_user(&updated)?;
                Ok(updated.id)
            },
            move |store, _| {
                store.upsert_user(&fallback)?;
                Ok(fallback.id)
            },
        )
        .await
    }

    pub async fn create_club(&self, club: &Club) -> Result<WriteAck> {
        let draft = club.clone();
        self.write_through(
            Scope::Clubs,
            Method::Post,
            "clubs".to_string(),
            without_id(wire::club_to_wire(club)),
            OutboundAction::CreateClub,
            |_| Ok(()),
            |store, body| {
                let created = wire::club_from_wire(body)?;
                store.upsert_club(&created)?;
                Ok(created.id)
            },
            move |store, local_id| {
                store.upsert_club(&Club {
                    id: local_id,
                    ..draft
                })?;
                Ok(local_id)
            },
        )
        .await
    }

    pub async fn update_club(&self, club: &Club) -> Result<WriteAck> {
        let draft = club.clone();
        let fallback = club.clone();
        self.write_through(
            Scope::Clubs,
            Method::Put,
            format!("clubs/{}", club.id),
            wire::club_to_wire(club),
            OutboundAction::UpdateClub,
            |_| Ok(()),
            move |store, body| {
                let updated = if body.is_null() {
                    draft
                } else {
                    wire::club_from_wire(body)?
                };
                store.upsert_club(&updated)?;
                Ok(updated.id)
            },
            move |store, _| {
                store.upsert_club(&fallback)?;
                Ok(fallback.id)
            },
        )
        .await
    }

    pub async fn delete_club(&self, club_id: i64) -> Result<WriteAck> {
        self.write_through(
            Scope::Clubs,
            Method::Delete,
            format!("clubs/{club_id}"),
            json!({ "id": club_id }),
            OutboundAction::DeleteClub,
            |_| Ok(()),
            move |store, _| {
                store.delete_club(club_id)?;
                Ok(club_id)
            },
            move |store, _| {
                store.delete_club(club_id)?;
                Ok(club_id)
            },
        )
        .await
    }

    pub async fn create_raid(&self, raid: &Raid) -> Result<WriteAck> {
        let draft = raid.clone();
        self.write_through(
            Scope::Raids,
            Method::Post,
            "raids".to_string(),
            without_id(wire::raid_to_wire(raid)),
            OutboundAction::CreateRaid,
            |_| Ok(()),
            |store, body| {
                let created = wire::raid_from_wire(body)?;
                store.upsert_raid(&created)?;
                Ok(created.id)
            },
            move |store, local_id| {
                store.upsert_raid(&Raid {
                    id: local_id,
                    ..draft
                })?;
                Ok(local_id)
            },
        )
        .await
    }

    pub async fn update_raid(&self, raid: &Raid) -> Result<WriteAck> {
        let draft = raid.clone();
        let fallback = raid.clone();
        self.write_through(
            Scope::Raids,
            Method::Put,
            format!("raids/{}", raid.id),
            wire::raid_to_wire(raid),
            OutboundAction::UpdateRaid,
            |_| Ok(()),
            move |store, body| {
                let updated = if body.is_null() {
                    draft
                } else {
                    wire::raid_from_wire(body)?
                };
                store.upsert_raid(&updated)?;
                Ok(updated.id)
            },
            move |store, _| {
                store.upsert_raid(&fallback)?;
                Ok(fallback.id)
            },
        )
        .await
    }

    pub async fn delete_raid(&self, raid_id: i64) -> Result<WriteAck> {
        self.write_through(
            Scope::Raids,
            Method::Delete,
            format!("raids/{raid_id}"),
            json!({ "id": raid_id }),
            OutboundAction::DeleteRaid,
            |_| Ok(()),
            move |store, _| {
                store.delete_raid(raid_id)?;
                store.clear_races_for_raid(raid_id)?;
                Ok(raid_id)
            },
            move |store, _| {
                store.delete_raid(raid_id)?;
                store.clear_races_for_raid(raid_id)?;
                Ok(raid_id)
            },
        )
        .await
    }

    /// Create a race with its category prices.
    ///
    /// Fails fast, before any network call, when the parent raid is at
    /// its configured race capacity or a composition invariant is
    /// violated.
    pub async fn create_race(&self, race: &Race, prices: &[CategoryPrice]) -> Result<WriteAck> {
        if !race.brackets.ordered() {
            return Err(raid_common::CompositionViolation::UnorderedBrackets {
                a: race.brackets.a,
                b: race.brackets.b,
                c: race.brackets.c,
            }
            .into());
        }
        availability::check_price_ordering(prices)?;

        let raid_id = race.raid_id;
        let draft = race.clone();
        let remote_prices: Vec<CategoryPrice> = prices.to_vec();
        let local_prices: Vec<CategoryPrice> = prices.to_vec();

        let mut payload = without_id(wire::race_to_wire(race));
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                "prices".to_string(),
                Value::Array(prices.iter().map(wire::price_to_wire).collect()),
            );
        }

        self.write_through(
            Scope::RacesOf(raid_id),
            Method::Post,
            "races".to_string(),
            payload,
            OutboundAction::CreateRace,
            move |store| {
                let raid = store.get_raid(raid_id)?.ok_or(RaidError::NotFound)?;
                let count = store.count_races_for_raid(raid_id)?;
                if count >= raid.nb_races {
                    return Err(RaidError::Capacity {
                        limit: raid.nb_races,
                    });
                }
                Ok(())
            },
            move |store, body| {
                let created = wire::race_from_wire(body)?;
                store.upsert_race(&created)?;
                let prices = match body.get("prices") {
                    Some(embedded) => wire::prices_from_wire(embedded)?,
                    None => remote_prices
                        .into_iter()
                        .map(|p| CategoryPrice {
                            race_id: created.id,
                            ..p
                        })
                        .collect(),
                };
                for price in &prices {
                    store.upsert_price(price)?;
                }
                Ok(created.id)
            },
            move |store, local_id| {
                store.upsert_race(&Race {
                    id: local_id,
                    ..draft
                })?;
                for price in local_prices {
                    store.upsert_price(&CategoryPrice {
                        race_id: local_id,
                        ..price
                    })?;
                }
                Ok(local_id)
            },
        )
        .await
    }

    pub async fn delete_race(&self, race_id: i64, raid_id: i64) -> Result<WriteAck> {
        self.write_through(
            Scope::RacesOf(raid_id),
            Method::Delete,
            format!("races/{race_id}"),
            json!({ "id": race_id }),
            OutboundAction::DeleteRace,
            |_| Ok(()),
            move |store, _| {
                store.delete_race(race_id)?;
                Ok(race_id)
            },
            move |store, _| {
                store.delete_race(race_id)?;
                Ok(race_id)
            },
        )
        .await
    }

    pub async fn create_team(&self, team: &Team) -> Result<WriteAck> {
        let draft = team.clone();
        self.write_through(
            Scope::Teams,
            Method::Post,
            "teams".to_string(),
            without_id(wire::team_to_wire(team)),
            OutboundAction::CreateTeam,
            |_| Ok(()),
            |store, body| {
                let created = wire::team_from_wire(body)?;
                store.upsert_team(&created)?;
                Ok(created.id)
            },
            move |store, local_id| {
                store.upsert_team(&Team {
                    id: local_id,
                    ..draft
                })?;
                Ok(local_id)
            },
        )
        .await
    }

    /// Add a user to a team being built for a race.
    ///
    /// Eligibility (membership, schedule overlap, minimum age) is
    /// re-checked against the cache before any network call; the roster
    /// bracket rule runs later, at [`Self::register_team_for_race`].
    pub async fn add_team_member(
        &self,
        team_id: i64,
        user_id: i64,
        race_id: i64,
    ) -> Result<WriteAck> {
        self.write_through(
            Scope::TeamsOf(race_id),
            Method::Post,
            format!("teams/{team_id}/members"),
            json!({ "teamId": team_id, "userId": user_id, "raceId": race_id }),
            OutboundAction::AddTeamMember,
            move |store| {
                let race = store.get_race(race_id)?.ok_or(RaidError::NotFound)?;
                let user = store.get_user(user_id)?.ok_or(RaidError::NotFound)?;
                let rostered = store.users_in_teams_for_race(race_id)?.contains(&user_id);
                let committed = store.races_for_user(user_id)?;
                let verdict = availability::user_availability(
                    &race,
                    &user,
                    rostered,
                    &committed,
                    Utc::now().date_naive(),
                );
                if let Some(reason) = verdict.reason {
                    return Err(RaidError::Validation {
                        fields: json!({ "userId": reason.as_tag() }),
                    });
                }
                Ok(())
            },
            move |store, _| {
                store.add_team_member(team_id, user_id)?;
                Ok(team_id)
            },
            move |store, _| {
                store.add_team_member(team_id, user_id)?;
                Ok(team_id)
            },
        )
        .await
    }

    /// Register a full team for a race; evaluates the A/B/C bracket rule
    /// on the complete roster.
    pub async fn register_team_for_race(&self, team_id: i64, race_id: i64) -> Result<WriteAck> {
        self.write_through(
            Scope::TeamsOf(race_id),
            Method::Post,
            format!("races/{race_id}/teams"),
            json!({ "teamId": team_id, "raceId": race_id }),
            OutboundAction::RegisterTeam,
            move |store| {
                let race = store.get_race(race_id)?.ok_or(RaidError::NotFound)?;
                let today = Utc::now().date_naive();
                let mut ages = Vec::new();
                for member in store.list_team_members(team_id)? {
                    if let Some(user) = store.get_user(member)? {
                        if let Some(age) = user.age_on(today) {
                            ages.push(age);
                        }
                    }
                }
                availability::check_team_ages(&ages, &race.brackets)
            },
            move |store, body| {
                let registration = if body.is_object() {
                    wire::team_registration_from_wire(body)?
                } else {
                    TeamRegistration {
                        team_id,
                        race_id,
                        validated: false,
                        finish_time: None,
                        bib: None,
                    }
                };
                store.upsert_team_registration(&registration)?;
                Ok(team_id)
            },
            move |store, _| {
                store.upsert_team_registration(&TeamRegistration {
                    team_id,
                    race_id,
                    validated: false,
                    finish_time: None,
                    bib: None,
                })?;
                Ok(team_id)
            },
        )
        .await
    }

    /// Register an individual runner. Runners without a licence number
    /// must attach a proof-of-sport document.
    pub async fn register_runner(&self, registration: &RaceRegistration) -> Result<WriteAck> {
        let user_id = registration.user_id;
        let race_id = registration.race_id;
        let has_pps = registration.pps_document.is_some();
        let draft = registration.clone();
        let fallback = registration.clone();

        self.write_through(
            Scope::RegistrationsOf(race_id),
            Method::Post,
            format!("races/{race_id}/registrations"),
            wire::race_registration_to_wire(registration),
            OutboundAction::RegisterRunner,
            move |store| {
                let user = store.get_user(user_id)?.ok_or(RaidError::NotFound)?;
                if user.licence.is_none() && !has_pps {
                    return Err(RaidError::Validation {
                        fields: json!({ "ppsDocument": "required for runners without a licence" }),
                    });
                }
                Ok(())
            },
            move |store, body| {
                let confirmed = if body.is_object() {
                    wire::race_registration_from_wire(body)?
                } else {
                    draft
                };
                store.upsert_race_registration(&confirmed)?;
                Ok(confirmed.user_id)
            },
            move |store, _| {
                store.upsert_race_registration(&fallback)?;
                Ok(fallback.user_id)
            },
        )
        .await
    }

    // --- availability ---

    /// Per-user eligibility for a race, computed from the local cache
    pub fn availability_for_race(&self, race_id: i64) -> Result<Vec<availability::Availability>> {
        let store = self.store();
        let race = store.get_race(race_id)?.ok_or(RaidError::NotFound)?;
        let users = store.list_users()?;
        let rostered = store.users_in_teams_for_race(race_id)?;
        let today = Utc::now().date_naive();

        users
            .iter()
            .map(|user| {
                let committed = store.races_for_user(user.id)?;
                Ok(availability::user_availability(
                    &race,
                    user,
                    rostered.contains(&user.id),
                    &committed,
                    today,
                ))
            })
            .collect()
    }
}

fn without_id(mut payload: Value) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.remove("id");
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_id_strips_only_the_id() {
        let payload = without_id(json!({"id": 4, "name": "x"}));
        assert_eq!(payload, json!({"name": "x"}));
    }
}
