//! # Raidlink Sync Coordinator
//!
//! Offline-first synchronization core for raid event data.
//!
//! ## Architecture
//!
//! - **Reads**: try the remote API, reconcile the local cache with
//!   replace-on-conflict semantics (scoped clear, then insert), fall back
//!   to cached rows on connectivity failure.
//! - **Writes**: inject the current auth token, write the authoritative
//!   server row on success; on connectivity failure write locally under a
//!   provisional clock id and queue the action for replay.
//! - **Replay**: FIFO by creation timestamp, triggered by an external
//!   connectivity signal; provisional ids are reconciled with server ids.
//! - **Availability**: pure eligibility rules consulted before team
//!   mutations so invalid state never reaches the queue.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use raid_config::Config;
//! use raid_remote::{HttpRemote, StaticToken};
//! use raid_store::Store;
//! use raid_sync::SyncCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> raid_common::Result<()> {
//!     let config = Config::load(std::path::Path::new("raidlink.toml"))?;
//!     let store = Store::open(&config.store.db_path)?;
//!     let remote = Arc::new(HttpRemote::new(&config.remote)?);
//!     let auth = Arc::new(StaticToken(Some("token".into())));
//!
//!     let coordinator = SyncCoordinator::new(store, remote, auth);
//!     let raids = coordinator.fetch_raids().await?;
//!     println!("{} raids ({:?})", raids.data.len(), raids.freshness);
//!     Ok(())
//! }
//! ```

pub mod availability;
pub mod connectivity;
pub mod coordinator;
pub mod replay;
mod scopes;

pub use availability::{
    check_price_ordering, check_team_ages, user_availability, Availability, IneligibilityReason,
};
pub use connectivity::watch_connectivity;
pub use coordinator::SyncCoordinator;
pub use replay::ReplayReport;

pub use raid_common::{Fetched, Freshness, RaidError, Result, WriteAck};
