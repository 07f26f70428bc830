//! Durable, synchronous persistence of the session token and the active
//! organization identity.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::warn;

use crate::auth::OrgIdentity;

/// File name of the raw token slot.
pub const TOKEN_SLOT: &str = "session_token";
/// File name of the JSON-encoded identity slot.
pub const IDENTITY_SLOT: &str = "org_identity.json";

/// Capability interface over the two credential slots.
///
/// Readers never fail: an unset slot or a malformed identity payload reads
/// as `None`. Writers are infallible from the caller's point of view;
/// persistence failures are logged and swallowed so the session flow is
/// never interrupted by the storage layer.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn identity(&self) -> Option<OrgIdentity>;
    fn set(&self, token: &str, identity: &OrgIdentity);
    fn clear(&self);
}

/// In-memory store for tests and ephemeral profiles.
///
/// The identity slot holds the JSON encoding, not the decoded value, so a
/// malformed payload behaves exactly as it does in the file-backed store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slots: RwLock<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    token: Option<String>,
    identity_json: Option<String>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the raw identity slot directly. Test hook for malformed
    /// payload behavior.
    pub fn set_raw_identity(&self, raw: &str) {
        self.write().identity_json = Some(raw.to_string());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Slots> {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Slots> {
        self.slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    fn identity(&self) -> Option<OrgIdentity> {
        let guard = self.read();
        let raw = guard.identity_json.as_deref()?;
        serde_json::from_str(raw).ok()
    }

    fn set(&self, token: &str, identity: &OrgIdentity) {
        let mut guard = self.write();
        guard.token = Some(token.to_string());
        guard.identity_json = serde_json::to_string(identity).ok();
    }

    fn clear(&self) {
        let mut guard = self.write();
        guard.token = None;
        guard.identity_json = None;
    }
}

/// Profile-directory-backed store: one file per slot, both removed
/// together on `clear`.
///
/// Safe to construct against a directory that does not exist (yet, or
/// ever): reads return `None` and writes log a warning instead of failing.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_slot(&self, slot: &str) -> Option<String> {
        fs::read_to_string(self.dir.join(slot))
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn write_slot(&self, slot: &str, value: &str) {
        if let Err(error) = fs::create_dir_all(&self.dir) {
            warn!("credential store unavailable at {:?}: {}", self.dir, error);
            return;
        }
        if let Err(error) = fs::write(self.dir.join(slot), value) {
            warn!("failed to persist credential slot {}: {}", slot, error);
        }
    }

    fn remove_slot(&self, slot: &str) {
        if let Err(error) = fs::remove_file(self.dir.join(slot))
            && error.kind() != ErrorKind::NotFound
        {
            warn!("failed to clear credential slot {}: {}", slot, error);
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        self.read_slot(TOKEN_SLOT)
    }

    fn identity(&self) -> Option<OrgIdentity> {
        let raw = self.read_slot(IDENTITY_SLOT)?;
        serde_json::from_str(&raw).ok()
    }

    fn set(&self, token: &str, identity: &OrgIdentity) {
        self.write_slot(TOKEN_SLOT, token);
        if let Ok(encoded) = serde_json::to_string(identity) {
            self.write_slot(IDENTITY_SLOT, &encoded);
        }
    }

    fn clear(&self) {
        self.remove_slot(TOKEN_SLOT);
        self.remove_slot(IDENTITY_SLOT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> OrgIdentity {
        OrgIdentity::new("h1", "General")
    }

    #[test]
    fn memory_round_trip() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.token(), None);
        assert_eq!(store.identity(), None);

        store.set("t1", &sample_identity());
        assert_eq!(store.token().as_deref(), Some("t1"));
        assert_eq!(store.identity(), Some(sample_identity()));

        store.clear();
        assert_eq!(store.token(), None);
        assert_eq!(store.identity(), None);
    }

    #[test]
    fn memory_malformed_identity_reads_as_absent() {
        let store = MemoryCredentialStore::new();
        store.set_raw_identity("{not json");
        assert_eq!(store.identity(), None);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path());

        store.set("t1", &sample_identity());
        assert_eq!(store.token().as_deref(), Some("t1"));
        assert_eq!(store.identity(), Some(sample_identity()));

        // Both slots must land on disk.
        assert!(dir.path().join(TOKEN_SLOT).exists());
        assert!(dir.path().join(IDENTITY_SLOT).exists());

        store.clear();
        assert_eq!(store.token(), None);
        assert_eq!(store.identity(), None);
        assert!(!dir.path().join(TOKEN_SLOT).exists());
    }

    #[test]
    fn file_malformed_identity_reads_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path());
        store.set("t1", &sample_identity());

        fs::write(dir.path().join(IDENTITY_SLOT), "{not json").expect("overwrite slot");
        assert_eq!(store.identity(), None);
        // The token slot is unaffected.
        assert_eq!(store.token().as_deref(), Some("t1"));
    }

    #[test]
    fn file_missing_profile_dir_is_inert() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("does-not-exist");
        let store = FileCredentialStore::new(&missing);

        assert_eq!(store.token(), None);
        assert_eq!(store.identity(), None);
        // Clearing an already-clear store must be a no-op, not an error.
        store.clear();
        store.clear();
    }

    #[test]
    fn file_set_overwrites_previous_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path());

        store.set("t1", &sample_identity());
        store.set("t2", &OrgIdentity::new("h2", "Mercy West"));

        assert_eq!(store.token().as_deref(), Some("t2"));
        assert_eq!(store.identity(), Some(OrgIdentity::new("h2", "Mercy West")));
    }
}
