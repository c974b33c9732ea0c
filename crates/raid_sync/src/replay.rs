//! Outbound queue replay
//!
//! Queued writes are replayed strictly in creation order so causal
//! chains (create a team, add its members, register it) reach the
//! server in the order they happened locally.
//!
//! A connectivity failure aborts the run and leaves the failing entry
//! and everything behind it pending; so does an auth failure, since the
//! entry can succeed once the caller re-authenticates. A permission or
//! validation rejection cannot succeed by retrying, so the entry is
//! dropped with a warning and the run continues.
//!
//! Creates performed offline carry a provisional clock id; once the
//! server assigns the real id the provisional row is replaced and every
//! later queued payload referencing the provisional id is rewritten.

use crate::coordinator::SyncCoordinator;
use crate::scopes::Scope;
use raid_common::entities::{CategoryPrice, OutboundAction};
use raid_common::{RaidError, Result};
use raid_remote::Method;
use raid_store::Store;
use raid_wire as wire;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Outcome of one replay run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    /// Entries acknowledged by the server
    pub replayed: usize,
    /// Entries dropped because the server rejected them
    pub rejected: usize,
    /// Entries still pending after the run
    pub remaining: usize,
}

impl SyncCoordinator {
    /// Replay all pending outbound entries, FIFO.
    pub async fn replay_pending(&self) -> Result<ReplayReport> {
        let _guard = self.scopes.hold(Scope::Queue).await;

        let entries = self.store().list_pending_outbound()?;
        if entries.is_empty() {
            return Ok(ReplayReport::default());
        }
        tracing::info!(pending = entries.len(), "replaying outbound queue");

        let mut report = ReplayReport::default();
        let mut id_map: HashMap<i64, i64> = HashMap::new();

        for entry in entries {
            let mut payload = entry.payload.clone();
            let local_id = take_local_id(&mut payload);
            remap_ids(&mut payload, &id_map);

            let (method, path) = request_for(&entry.action, &payload)?;
            // The provider may rotate the token mid-run; ask before
            // every request
            let token = self.token();
            match self
                .remote()
                .request(method, &path, token.as_deref(), Some(payload))
                .await
            {
                Ok(body) => {
                    let store = self.store();
                    if let Some((provisional, server)) =
                        reconcile(&store, &entry.action, &body, local_id)?
                    {
                        tracing::debug!(provisional, server, "provisional id reconciled");
                        id_map.insert(provisional, server);
                    }
                    store.dequeue_outbound(entry.id)?;
                    report.replayed += 1;
                }
                Err(e) if e.is_connectivity() => {
                    tracing::warn!(entry = entry.id, error = %e, "replay interrupted");
                    break;
                }
                // An expired token is recoverable; suspend the run and
                // keep the entry for after re-authentication
                Err(e @ RaidError::Auth(_)) => {
                    tracing::warn!(entry = entry.id, error = %e, "token rejected, replay suspended");
                    break;
                }
                Err(e) => {
                    // Retrying cannot change the server's answer
                    tracing::warn!(
                        entry = entry.id,
                        action = entry.action.as_tag(),
                        error = %e,
                        "queued write rejected, dropping"
                    );
                    self.store().dequeue_outbound(entry.id)?;
                    report.rejected += 1;
                }
            }
        }

        report.remaining = self.store().list_pending_outbound()?.len();
        tracing::info!(
            replayed = report.replayed,
            rejected = report.rejected,
            remaining = report.remaining,
            "replay run finished"
        );
        Ok(report)
    }
}

fn take_local_id(payload: &mut Value) -> Option<i64> {
    payload
        .as_object_mut()
        .and_then(|map| map.remove("localId"))
        .and_then(|v| v.as_i64())
}

/// Rewrite id references that point at provisional ids reconciled
/// earlier in this run
fn remap_ids(payload: &mut Value, id_map: &HashMap<i64, i64>) {
    if id_map.is_empty() {
        return;
    }
    if let Some(map) = payload.as_object_mut() {
        for (key, value) in map.iter_mut() {
            if key == "id" || key.ends_with("Id") {
                if let Some(server) = value.as_i64().and_then(|old| id_map.get(&old)) {
                    *value = json!(server);
                }
            }
        }
    }
}

fn request_for(action: &OutboundAction, payload: &Value) -> Result<(Method, String)> {
    let id_of = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| RaidError::Mapping(format!("queued payload missing '{key}'")))
    };

    Ok(match action {
        OutboundAction::CreateAddress => (Method::Post, "addresses".to_string()),
        OutboundAction::CreateUser => (Method::Post, "users".to_string()),
        OutboundAction::UpdateUser => (Method::Put, format!("users/{}", id_of("id")?)),
        OutboundAction::CreateClub => (Method::Post, "clubs".to_string()),
        OutboundAction::UpdateClub => (Method::Put, format!("clubs/{}", id_of("id")?)),
        OutboundAction::DeleteClub => (Method::Delete, format!("clubs/{}", id_of("id")?)),
        OutboundAction::CreateRaid => (Method::Post, "raids".to_string()),
        OutboundAction::UpdateRaid => (Method::Put, format!("raids/{}", id_of("id")?)),
        OutboundAction::DeleteRaid => (Method::Delete, format!("raids/{}", id_of("id")?)),
        OutboundAction::CreateRace => (Method::Post, "races".to_string()),
        OutboundAction::DeleteRace => (Method::Delete, format!("races/{}", id_of("id")?)),
        OutboundAction::CreateTeam => (Method::Post, "teams".to_string()),
        OutboundAction::AddTeamMember => {
            (Method::Post, format!("teams/{}/members", id_of("teamId")?))
        }
        OutboundAction::RegisterTeam => {
            (Method::Post, format!("races/{}/teams", id_of("raceId")?))
        }
        OutboundAction::RegisterRunner => (
            Method::Post,
            format!("races/{}/registrations", id_of("raceId")?),
        ),
    })
}

/// Apply the server's answer to the cache. For creates performed
/// offline this replaces the provisional row with the server row and
/// returns the (provisional, server) id pair.
fn reconcile(
    store: &Store,
    action: &OutboundAction,
    body: &Value,
    local_id: Option<i64>,
) -> Result<Option<(i64, i64)>> {
    match action {
        OutboundAction::CreateAddress => {
            let created = wire::address_from_wire(body)?;
            store.upsert_address(&created)?;
            swap(local_id, created.id, |old| store.delete_address(old))
        }
        OutboundAction::CreateUser => {
            let created = wire::user_from_wire(body)?;
            store.upsert_user(&created)?;
            swap(local_id, created.id, |old| store.delete_user(old))
        }
        OutboundAction::CreateClub => {
            let created = wire::club_from_wire(body)?;
            store.upsert_club(&created)?;
            swap(local_id, created.id, |old| store.delete_club(old))
        }
        OutboundAction::CreateRaid => {
            let created = wire::raid_from_wire(body)?;
            store.upsert_raid(&created)?;
            swap(local_id, created.id, |old| store.delete_raid(old))
        }
        OutboundAction::CreateRace => {
            let created = wire::race_from_wire(body)?;
            store.upsert_race(&created)?;
            let prices = match (body.get("prices"), local_id) {
                (Some(embedded), _) => wire::prices_from_wire(embedded)?,
                (None, Some(old)) => store
                    .list_prices_for_race(old)?
                    .into_iter()
                    .map(|p| CategoryPrice {
                        race_id: created.id,
                        ..p
                    })
                    .collect(),
                (None, None) => Vec::new(),
            };
            let pair = swap(local_id, created.id, |old| store.delete_race(old))?;
            for price in &prices {
                store.upsert_price(price)?;
            }
            Ok(pair)
        }
        OutboundAction::CreateTeam => {
            let created = wire::team_from_wire(body)?;
            store.upsert_team(&created)?;
            if let Some(old) = local_id.filter(|&old| old != created.id) {
                for member in store.list_team_members(old)? {
                    store.add_team_member(created.id, member)?;
                }
                store.delete_team(old)?;
                return Ok(Some((old, created.id)));
            }
            Ok(None)
        }
        OutboundAction::UpdateUser => {
            if body.is_object() {
                store.upsert_user(&wire::user_from_wire(body)?)?;
            }
            Ok(None)
        }
        OutboundAction::UpdateClub => {
            if body.is_object() {
                store.upsert_club(&wire::club_from_wire(body)?)?;
            }
            Ok(None)
        }
        OutboundAction::UpdateRaid => {
            if body.is_object() {
                store.upsert_raid(&wire::raid_from_wire(body)?)?;
            }
            Ok(None)
        }
        OutboundAction::RegisterTeam => {
            if body.is_object() {
                store.upsert_team_registration(&wire::team_registration_from_wire(body)?)?;
            }
            Ok(None)
        }
        OutboundAction::RegisterRunner => {
            if body.is_object() {
                store.upsert_race_registration(&wire::race_registration_from_wire(body)?)?;
            }
            Ok(None)
        }
        // Local state already reflects these
        OutboundAction::DeleteClub
        | OutboundAction::DeleteRaid
        | OutboundAction::DeleteRace
        | OutboundAction::AddTeamMember => Ok(None),
    }
}

fn swap(
    local_id: Option<i64>,
    server_id: i64,
    delete: impl FnOnce(i64) -> Result<()>,
) -> Result<Option<(i64, i64)>> {
    match local_id.filter(|&old| old != server_id) {
        Some(old) => {
            delete(old)?;
            Ok(Some((old, server_id)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_rewrites_provisional_references() {
        let mut payload = json!({"teamId": 100, "userId": 7, "name": "x"});
        let map = HashMap::from([(100, 42)]);
        remap_ids(&mut payload, &map);
        assert_eq!(payload, json!({"teamId": 42, "userId": 7, "name": "x"}));
    }

    #[test]
    fn remap_leaves_plain_fields_alone() {
        let mut payload = json!({"bib": 100});
        let map = HashMap::from([(100, 42)]);
        remap_ids(&mut payload, &map);
        assert_eq!(payload, json!({"bib": 100}));
    }

    #[test]
    fn request_paths_carry_payload_ids() {
        let (method, path) =
            request_for(&OutboundAction::AddTeamMember, &json!({"teamId": 9})).unwrap();
        assert_eq!(method, Method::Post);
        assert_eq!(path, "teams/9/members");

        let (method, path) =
            request_for(&OutboundAction::UpdateUser, &json!({"id": 3})).unwrap();
        assert_eq!(method, Method::Put);
        assert_eq!(path, "users/3");
    }

    #[test]
    fn missing_path_id_is_a_mapping_error() {
        let result = request_for(&OutboundAction::RegisterTeam, &json!({"teamId": 9}));
        assert!(matches!(result, Err(RaidError::Mapping(_))));
    }

    #[test]
    fn take_local_id_strips_the_key() {
        let mut payload = json!({"localId": 100, "name": "x"});
        assert_eq!(take_local_id(&mut payload), Some(100));
        assert_eq!(payload, json!({"name": "x"}));
    }
}
