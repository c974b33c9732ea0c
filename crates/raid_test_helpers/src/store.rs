//! Pre-seeded stores for coordinator tests

use crate::fixtures;
use raid_store::Store;
use tempfile::TempDir;

pub fn memory_store() -> Store {
    Store::open_in_memory().expect("in-memory store")
}

/// In-memory store seeded with the standard fixture rows:
/// address 1, users 1-3 (user 3 is a 2014 minor), club 1, raid 1
/// (capacity 3) and race 1.
pub fn seeded_store() -> Store {
    let store = memory_store();
    store.upsert_address(&fixtures::address(1)).unwrap();
    store.upsert_user(&fixtures::user(1, Some(1990))).unwrap();
    store.upsert_user(&fixtures::user(2, Some(1995))).unwrap();
    store.upsert_user(&fixtures::user(3, Some(2014))).unwrap();
    store.upsert_club(&fixtures::club(1)).unwrap();
    store.upsert_raid(&fixtures::raid(1, 3)).unwrap();
    store.upsert_race(&fixtures::race(1, 1)).unwrap();
    store
}

/// On-disk store in a temp directory; returns the guard so the
/// directory outlives the store.
pub fn disk_store() -> (Store, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = Store::open(&dir.path().join("cache.db")).expect("on-disk store");
    (store, dir)
}
