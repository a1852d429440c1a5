//! Per-user remote host store
//!
//! Each user owns one ordered JSON document of remote hosts, kept under the
//! configured hosts directory as `<username>_hosts.json`. Writes to a given
//! user's document are serialized through a per-user lock so concurrent
//! mutations cannot clobber each other; distinct users never contend.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use wm_core::error::HostStoreError;
use wm_core::types::{HostId, HostPatch, HostSpec, RemoteHost};

/// CRUD store for per-user remote host lists.
pub struct HostStore {
    /// Directory holding one document per user
    dir: PathBuf,
    /// Per-user write locks
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl HostStore {
    /// Create a store rooted at the given directory.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            locks: DashMap::new(),
        }
    }

    /// List a user's hosts in document order.
    pub async fn list(&self, username: &str) -> Result<Vec<RemoteHost>, HostStoreError> {
        let lock = self.lock_for(username);
        let _guard = lock.lock().await;
        self.load(username)
    }

    /// Look up one host by id.
    pub async fn get(&self, username: &str, id: &HostId) -> Result<RemoteHost, HostStoreError> {
        let hosts = self.list(username).await?;
        hosts
            .into_iter()
            .find(|h| &h.id == id)
            .ok_or_else(|| HostStoreError::NotFound(id.clone()))
    }

    /// Add a host, generating its id and filling defaults from the spec.
    pub async fn add(
        &self,
        username: &str,
        spec: HostSpec,
    ) -> Result<RemoteHost, HostStoreError> {
        let lock = self.lock_for(username);
        let _guard = lock.lock().await;

        let mut hosts = self.load(username)?;
        let host = RemoteHost {
            id: HostId::new(generate_host_id()),
            name: spec.name.unwrap_or_else(|| spec.hostname.clone()),
            hostname: spec.hostname,
            port: spec.port.unwrap_or(22),
            username: spec.username,
            enabled: spec.enabled.unwrap_or(true),
        };
        hosts.push(host.clone());
        self.save(username, &hosts)?;

        debug!(user = username, host = %host.id, "Added remote host");
        Ok(host)
    }

    /// Patch an existing host; absent fields are left untouched.
    pub async fn update(
        &self,
        username: &str,
        id: &HostId,
        patch: HostPatch,
    ) -> Result<RemoteHost, HostStoreError> {
        let lock = self.lock_for(username);
        let _guard = lock.lock().await;

        let mut hosts = self.load(username)?;
        let host = hosts
            .iter_mut()
            .find(|h| &h.id == id)
            .ok_or_else(|| HostStoreError::NotFound(id.clone()))?;

        if let Some(name) = patch.name {
            host.name = name;
        }
        if let Some(hostname) = patch.hostname {
            host.hostname = hostname;
        }
        if let Some(port) = patch.port {
            host.port = port;
        }
        if let Some(username) = patch.username {
            host.username = Some(username);
        }
        if let Some(enabled) = patch.enabled {
            host.enabled = enabled;
        }
        let updated = host.clone();
        self.save(username, &hosts)?;
        Ok(updated)
    }

    /// Remove a host. Removing an absent id succeeds without effect.
    pub async fn delete(&self, username: &str, id: &HostId) -> Result<(), HostStoreError> {
        let lock = self.lock_for(username);
        let _guard = lock.lock().await;

        let mut hosts = self.load(username)?;
        let before = hosts.len();
        hosts.retain(|h| &h.id != id);
        if hosts.len() != before {
            self.save(username, &hosts)?;
        }
        Ok(())
    }

    fn lock_for(&self, username: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn user_file(&self, username: &str) -> Result<PathBuf, HostStoreError> {
        // Usernames arrive from the authenticated front layer, but they
        // become file names here, so path separators are rejected outright.
        if username.is_empty() || username.contains('/') || username.contains("..") {
            return Err(HostStoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid username: {:?}", username),
            )));
        }
        Ok(self.dir.join(format!("{}_hosts.json", username)))
    }

    fn load(&self, username: &str) -> Result<Vec<RemoteHost>, HostStoreError> {
        let path = self.user_file(username)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, username: &str, hosts: &[RemoteHost]) -> Result<(), HostStoreError> {
        let path = self.user_file(username)?;
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(hosts)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

/// Generate a short host id: the first 8 hex chars of a v4 uuid.
fn generate_host_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, HostStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HostStore::new(dir.path().join("hosts"));
        (dir, store)
    }

    fn spec(hostname: &str) -> HostSpec {
        HostSpec {
            name: None,
            hostname: hostname.to_string(),
            port: None,
            username: None,
            enabled: None,
        }
    }

    #[tokio::test]
    async fn test_add_list_roundtrip() {
        let (_dir, store) = store();
        let added = store.add("alice", spec("build.example.com")).await.unwrap();
        assert_eq!(added.id.as_str().len(), 8);
        assert_eq!(added.name, "build.example.com");
        assert_eq!(added.port, 22);
        assert!(added.enabled);

        let hosts = store.list("alice").await.unwrap();
        assert_eq!(hosts, vec![added]);
    }

    #[tokio::test]
    async fn test_update_patches_only_given_fields() {
        let (_dir, store) = store();
        let added = store.add("alice", spec("build.example.com")).await.unwrap();

        let updated = store
            .update(
                "alice",
                &added.id,
                HostPatch {
                    port: Some(2222),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.port, 2222);
        assert_eq!(updated.hostname, "build.example.com");
    }

    #[tokio::test]
    async fn test_update_unknown_host_fails() {
        let (_dir, store) = store();
        let err = store
            .update("alice", &HostId::new("deadbeef"), HostPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HostStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        let added = store.add("alice", spec("build.example.com")).await.unwrap();
        store.delete("alice", &added.id).await.unwrap();
        assert!(store.list("alice").await.unwrap().is_empty());
        // Deleting again is a successful no-op
        store.delete("alice", &added.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_user_lists_are_disjoint() {
        let (_dir, store) = store();
        store.add("alice", spec("a.example.com")).await.unwrap();
        store.add("bob", spec("b.example.com")).await.unwrap();

        let alice = store.list("alice").await.unwrap();
        let bob = store.list("bob").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(bob.len(), 1);
        assert_ne!(alice[0].hostname, bob[0].hostname);
    }

    #[tokio::test]
    async fn test_concurrent_adds_all_survive() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .add("alice", spec(&format!("host{}.example.com", i)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.list("alice").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_path_escaping_username_rejected() {
        let (_dir, store) = store();
        assert!(store.list("../etc").await.is_err());
        assert!(store.list("a/b").await.is_err());
    }
}
