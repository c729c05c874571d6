//! Card Vault
//!
//! Keeps at most one card per owner. A missing record is an ordinary state
//! ([`StoredCard::empty`]), never an error; unreadable storage is.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::card::{EffectiveCard, Expiry, StoredCard};
use crate::error::{CheckoutError, Result};

/// Card storage backend
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Record for `owner`, `None` when nothing is on file
    async fn fetch(&self, owner: &str) -> Result<Option<StoredCard>>;

    /// Replace (or create) the record for `owner`
    async fn upsert(&self, owner: &str, card: &EffectiveCard) -> Result<()>;
}

/// In-memory card store (for development)
pub struct MemoryCardStore {
    cards: RwLock<HashMap<String, StoredCard>>,
}

impl Default for MemoryCardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self {
            cards: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> CheckoutError {
        CheckoutError::Storage("card store lock poisoned".into())
    }
}

#[async_trait]
impl CardStore for MemoryCardStore {
    async fn fetch(&self, owner: &str) -> Result<Option<StoredCard>> {
        let cards = self.cards.read().map_err(|_| Self::poisoned())?;
        Ok(cards.get(owner).cloned())
    }

    async fn upsert(&self, owner: &str, card: &EffectiveCard) -> Result<()> {
        let mut cards = self.cards.write().map_err(|_| Self::poisoned())?;
        cards.insert(
            owner.to_string(),
            StoredCard::new(owner, card.number.clone(), card.expiry),
        );
        Ok(())
    }
}

/// On-disk layout of one vault record
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CardRecord {
    number: String,
    expiry_month: u32,
    expiry_year: i32,
}

/// On-disk layout of the whole vault file, owners in sorted order
#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultDocument {
    #[serde(default)]
    cards: BTreeMap<String, CardRecord>,
}

/// JSON file card store
///
/// The whole vault is one document; every save rewrites it through a
/// temporary file and a rename.
pub struct FileCardStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<VaultDocument> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VaultDocument::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw).map_err(|e| {
            CheckoutError::VaultCorrupt(format!("{}: {}", self.path.display(), e))
        })
    }

    async fn write_document(&self, doc: &VaultDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CardStore for FileCardStore {
    async fn fetch(&self, owner: &str) -> Result<Option<StoredCard>> {
        let doc = self.read_document().await?;
        Ok(doc.cards.get(owner).map(|record| {
            StoredCard::new(
                owner,
                record.number.clone(),
                Expiry::new(record.expiry_month, record.expiry_year),
            )
        }))
    }

    async fn upsert(&self, owner: &str, card: &EffectiveCard) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut doc = self.read_document().await?;
        doc.cards.insert(
            owner.to_string(),
            CardRecord {
                number: card.number.clone(),
                expiry_month: card.expiry.month,
                expiry_year: card.expiry.year,
            },
        );
        self.write_document(&doc).await
    }
}

/// Vault adapter used by checkout
///
/// Saves for the same owner run one at a time. A per-owner lock lives only
/// while some save for that owner holds or waits on it.
pub struct CardVault {
    store: Arc<dyn CardStore>,
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CardVault {
    pub fn new(store: Arc<dyn CardStore>) -> Self {
        Self {
            store,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Card on file for `owner`, or the empty sentinel
    pub async fn load_card(&self, owner: &str) -> Result<StoredCard> {
        match self.store.fetch(owner).await? {
            Some(card) => Ok(card),
            None => {
                tracing::debug!(owner = %owner, "No card on file");
                Ok(StoredCard::empty(owner))
            }
        }
    }

    /// Remember `card` for `owner`, replacing whatever was there
    pub async fn save_card(&self, owner: &str, card: &EffectiveCard) -> Result<()> {
        let lock = self.owner_lock(owner).await;
        let saved = {
            let _guard = lock.lock().await;
            self.store.upsert(owner, card).await
        };
        self.release_owner_lock(owner, lock).await;
        saved?;

        tracing::info!(
            owner = %owner,
            card = %card.fingerprint(),
            "Saved card for user"
        );
        Ok(())
    }

    async fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().await;
        locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Clones are only handed out under the map lock, so a count of two
    // (map + ours) means no other save is holding or waiting on it.
    async fn release_owner_lock(&self, owner: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.owner_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(owner);
        }
    }

    #[cfg(test)]
    async fn tracked_owners(&self) -> usize {
        self.owner_locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn card(number: &str, month: u32, year: i32) -> EffectiveCard {
        EffectiveCard::new(number, Expiry::new(month, year))
    }

    #[tokio::test]
    async fn test_missing_card_is_empty_sentinel() {
        let vault = CardVault::new(Arc::new(MemoryCardStore::new()));

        let stored = vault.load_card("nobody").await.unwrap();
        assert_eq!(stored, StoredCard::empty("nobody"));
        assert!(!stored.is_on_file());
    }

    #[tokio::test]
    async fn test_save_is_full_replace() {
        let vault = CardVault::new(Arc::new(MemoryCardStore::new()));

        vault.save_card("alice", &card("5555666677778888", 5, 2026)).await.unwrap();
        vault.save_card("alice", &card("4111111111111111", 12, 2030)).await.unwrap();

        let stored = vault.load_card("alice").await.unwrap();
        assert_eq!(stored.number, "4111111111111111");
        assert_eq!(stored.expiry, Expiry::new(12, 2030));
    }

    #[tokio::test]
    async fn test_repeated_save_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cards.json");
        let vault = CardVault::new(Arc::new(FileCardStore::new(&path)));
        for (i, owner) in ["bob", "carol", "dave", "erin", "frank", "grace"].iter().enumerate() {
            vault.save_card(owner, &card("5555666677778888", i as u32 + 1, 2029)).await.unwrap();
        }
        let effective = card("4111111111111111", 12, 2030);

        vault.save_card("alice", &effective).await.unwrap();
        let once = std::fs::read(&path).unwrap();
        for _ in 0..10 {
            vault.save_card("alice", &effective).await.unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), once);
        }
    }

    #[tokio::test]
    async fn test_owner_locks_released_after_save() {
        let vault = Arc::new(CardVault::new(Arc::new(MemoryCardStore::new())));

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                let owner = format!("user{}", i % 4);
                vault.save_card(&owner, &card("4111111111111111", i % 12 + 1, 2030)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(vault.tracked_owners().await, 0);
        assert!(vault.load_card("user3").await.unwrap().is_on_file());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cards.json");

        let store = FileCardStore::new(&path);
        store.upsert("alice", &card("5555666677778888", 5, 2026)).await.unwrap();
        store.upsert("bob", &card("4111111111111111", 1, 2031)).await.unwrap();

        let reopened = FileCardStore::new(&path);
        let alice = reopened.fetch("alice").await.unwrap().unwrap();
        assert_eq!(alice.number, "5555666677778888");
        assert_eq!(alice.owner, "alice");
        assert!(reopened.fetch("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_vault() {
        let dir = TempDir::new().unwrap();
        let vault = CardVault::new(Arc::new(FileCardStore::new(dir.path().join("absent.json"))));

        let stored = vault.load_card("alice").await.unwrap();
        assert!(!stored.is_on_file());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cards.json");
        std::fs::write(&path, b"<cards><card/></cards>").unwrap();

        let vault = CardVault::new(Arc::new(FileCardStore::new(&path)));
        let err = vault.load_card("alice").await.unwrap_err();
        assert!(matches!(err, CheckoutError::VaultCorrupt(_)));
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_every_owner() {
        let dir = TempDir::new().unwrap();
        let vault = Arc::new(CardVault::new(Arc::new(FileCardStore::new(
            dir.path().join("cards.json"),
        ))));

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                let owner = format!("user{i}");
                vault.save_card(&owner, &card("4111111111111111", i + 1, 2030)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for i in 0..8u32 {
            let stored = vault.load_card(&format!("user{i}")).await.unwrap();
            assert_eq!(stored.expiry.month, i + 1);
        }
    }
}
