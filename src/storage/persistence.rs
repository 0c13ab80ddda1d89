//! Factory snapshots
//!
//! A snapshot is a versioned JSON envelope around a [`WalletFactory`]. Reading
//! one re-checks every wallet (owner set, per-transaction quorum, approvers,
//! event sequence) before the factory is handed back, so an edited or
//! partially written file is refused instead of trusted.

use crate::multisig::{MultisigError, WalletFactory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Snapshot rejected: {0}")]
    InvalidSnapshot(#[from] MultisigError),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub snapshot_file: String,
    pub backup_enabled: bool,
    /// Number of previous snapshots kept; `0` keeps none
    pub max_backups: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".quorum_wallet_data"),
            snapshot_file: "factory.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// Header of a snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub wallet_count: usize,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    wallet_count: usize,
    factory: &'a WalletFactory,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    wallet_count: usize,
    factory: WalletFactory,
}

/// Snapshot store for a wallet factory
///
/// The current snapshot lives at `data_dir/snapshot_file`; backup `0` is the
/// snapshot replaced by the latest save, higher indices are older.
pub struct FactoryStore {
    config: StoreConfig,
}

impl FactoryStore {
    /// Create a new store, creating the data directory if needed
    pub fn new(config: StoreConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(StoreConfig::default())
    }

    fn snapshot_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.snapshot_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.snapshot_file, index))
    }

    fn keeps_backups(&self) -> bool {
        self.config.backup_enabled && self.config.max_backups > 0
    }

    /// Write a new snapshot, moving the current one into the backups
    pub fn save(&self, factory: &WalletFactory) -> Result<SnapshotInfo, StorageError> {
        let path = self.snapshot_path();
        if self.keeps_backups() && path.exists() {
            self.push_backup(&path)?;
        }

        let info = write_snapshot(factory, &path)?;
        log::info!(
            "saved {} wallets to {} (v{})",
            info.wallet_count,
            path.display(),
            info.version
        );
        Ok(info)
    }

    /// Read and verify the current snapshot
    pub fn load(&self) -> Result<WalletFactory, StorageError> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Err(StorageError::InvalidData(format!(
                "no snapshot at {}",
                path.display()
            )));
        }

        let factory = read_snapshot(&path)?;
        log::info!(
            "loaded {} wallets from {}",
            factory.wallet_count(),
            path.display()
        );
        Ok(factory)
    }

    /// Load the snapshot if present, otherwise start an empty factory
    pub fn load_or_default(&self) -> Result<WalletFactory, StorageError> {
        if self.exists() {
            self.load()
        } else {
            log::info!("no snapshot in {}, starting empty", self.config.data_dir.display());
            Ok(WalletFactory::new())
        }
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }

    /// Remove the snapshot together with its backups
    pub fn delete(&self) -> Result<(), StorageError> {
        let mut removed = 0;
        let paths = std::iter::once(self.snapshot_path())
            .chain(self.list_backups().into_iter().map(|i| self.backup_path(i)));
        for path in paths {
            if path.exists() {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        log::debug!("removed {} snapshot files", removed);
        Ok(())
    }

    /// Shift backups up by one and copy `current` into slot 0
    ///
    /// The oldest backup is overwritten once `max_backups` are kept.
    fn push_backup(&self, current: &Path) -> Result<(), StorageError> {
        for index in (1..self.config.max_backups).rev() {
            let newer = self.backup_path(index - 1);
            if newer.exists() {
                fs::rename(&newer, self.backup_path(index))?;
            }
        }
        fs::copy(current, self.backup_path(0))?;
        Ok(())
    }

    /// Read and verify backup `index`
    ///
    /// The current snapshot is left untouched; save the result to make it
    /// current again.
    pub fn restore_backup(&self, index: usize) -> Result<WalletFactory, StorageError> {
        let path = self.backup_path(index);
        if !path.exists() {
            return Err(StorageError::InvalidData(format!(
                "backup {} not found",
                index
            )));
        }

        let factory = read_snapshot(&path)?;
        log::info!(
            "restored {} wallets from backup {}",
            factory.wallet_count(),
            index
        );
        Ok(factory)
    }

    /// Indices of the backups present, newest first
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }

    /// Size and header of the current snapshot, plus the backup count
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let path = self.snapshot_path();
        let (file_size, latest) = if path.exists() {
            (fs::metadata(&path)?.len(), Some(read_info(&path)?))
        } else {
            (0, None)
        };

        Ok(StorageStats {
            file_size,
            backup_count: self.list_backups().len(),
            data_dir: self.config.data_dir.clone(),
            latest,
        })
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub file_size: u64,
    pub backup_count: usize,
    pub data_dir: PathBuf,
    /// Header of the current snapshot, if one exists
    pub latest: Option<SnapshotInfo>,
}

/// Write `factory` to `path` through a temporary file
fn write_snapshot(factory: &WalletFactory, path: &Path) -> Result<SnapshotInfo, StorageError> {
    let info = SnapshotInfo {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        wallet_count: factory.wallet_count(),
    };
    let envelope = SnapshotRef {
        version: info.version,
        saved_at: info.saved_at,
        wallet_count: info.wallet_count,
        factory,
    };

    let temp_path = path.with_extension("tmp");
    let mut writer = BufWriter::new(fs::File::create(&temp_path)?);
    serde_json::to_writer_pretty(&mut writer, &envelope)?;
    writer.flush()?;
    drop(writer);

    fs::rename(&temp_path, path)?;
    Ok(info)
}

fn read_snapshot(path: &Path) -> Result<WalletFactory, StorageError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let snapshot: Snapshot = serde_json::from_reader(reader)?;
    check_version(snapshot.version)?;

    let mut factory = snapshot.factory;
    if factory.wallet_count() != snapshot.wallet_count {
        return Err(StorageError::InvalidData(format!(
            "header lists {} wallets, body holds {}",
            snapshot.wallet_count,
            factory.wallet_count()
        )));
    }
    factory.verify()?;
    factory.rebuild_label_index();

    log::debug!(
        "read snapshot {} saved at {}",
        path.display(),
        snapshot.saved_at
    );
    Ok(factory)
}

/// Read only the header of a snapshot
fn read_info(path: &Path) -> Result<SnapshotInfo, StorageError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let info: SnapshotInfo = serde_json::from_reader(reader)?;
    check_version(info.version)?;
    Ok(info)
}

fn check_version(found: u32) -> Result<(), StorageError> {
    if found != SNAPSHOT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok(())
}

/// Export a factory snapshot to `path`
pub fn save_to_file(factory: &WalletFactory, path: &Path) -> Result<SnapshotInfo, StorageError> {
    write_snapshot(factory, path)
}

/// Import and verify a factory snapshot from `path`
pub fn load_from_file(path: &Path) -> Result<WalletFactory, StorageError> {
    read_snapshot(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Address;
    use crate::multisig::TransactionRequest;
    use serde_json::{json, Value};

    const LARGE: u128 = u64::MAX as u128 + 50;

    fn sample_factory() -> (WalletFactory, Address) {
        let mut factory = WalletFactory::new();
        let alice = Address::from("alice");
        let bob = Address::from("bob");
        let now = Utc::now();

        let address = factory
            .create_wallet(&alice, "mama", vec![alice.clone(), bob.clone()], now)
            .unwrap();
        let wallet = factory.wallet_mut(&address).unwrap();
        wallet.deposit("ETH", LARGE, now).unwrap();
        let id = wallet
            .submit(
                &alice,
                TransactionRequest::new("carol", LARGE - 20, 2).with_data(vec![7, 7]),
                now,
            )
            .unwrap();
        wallet.approve(&bob, id, now).unwrap();

        (factory, address)
    }

    fn temp_store(max_backups: usize) -> (tempfile::TempDir, FactoryStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
            max_backups,
            ..Default::default()
        };
        let store = FactoryStore::new(config).unwrap();
        (temp_dir, store)
    }

    /// Save `factory`, apply `edit` to the raw JSON, and write it back
    fn tamper(store: &FactoryStore, factory: &WalletFactory, edit: impl FnOnce(&mut Value)) {
        store.save(factory).unwrap();
        let path = store.snapshot_path();
        let mut value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        edit(&mut value);
        fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_save_load_factory() {
        let (_dir, store) = temp_store(5);
        let (factory, address) = sample_factory();

        assert!(!store.exists());
        let info = store.save(&factory).unwrap();
        assert_eq!(info.version, SNAPSHOT_VERSION);
        assert_eq!(info.wallet_count, 1);
        assert!(store.exists());

        let mut loaded = store.load().unwrap();
        assert_eq!(loaded.wallet_count(), 1);
        assert_eq!(loaded.latest_by_label("mama").unwrap().address(), &address);

        // Pending approvals survive a restart and the wallet keeps working
        let wallet = loaded.require_wallet_mut(&address).unwrap();
        assert_eq!(wallet.native_balance(), LARGE);
        assert_eq!(wallet.approval_count(0).unwrap(), 1);
        assert_eq!(wallet.transaction(0).unwrap().data, vec![7, 7]);
        assert_eq!(wallet.events().len(), 3);

        let now = Utc::now();
        wallet.approve(&Address::from("alice"), 0, now).unwrap();
        wallet.execute(&Address::from("relayer"), 0, now).unwrap();
        assert_eq!(wallet.native_balance(), 20);
    }

    #[test]
    fn test_load_missing_snapshot() {
        let (_dir, store) = temp_store(5);
        assert!(matches!(store.load(), Err(StorageError::InvalidData(_))));
        assert_eq!(store.load_or_default().unwrap().wallet_count(), 0);
        assert!(store.stats().unwrap().latest.is_none());
    }

    #[test]
    fn test_backup_rotation() {
        let (_dir, store) = temp_store(3);
        let (mut factory, _) = sample_factory();
        let creator = Address::from("alice");

        for i in 0..5 {
            store.save(&factory).unwrap();
            factory
                .create_wallet(&creator, &format!("w{}", i), vec![creator.clone()], Utc::now())
                .unwrap();
        }

        assert_eq!(store.list_backups(), vec![0, 1, 2]);

        // Newest backup first
        assert_eq!(store.restore_backup(0).unwrap().wallet_count(), 4);
        assert_eq!(store.restore_backup(2).unwrap().wallet_count(), 2);
        assert!(matches!(
            store.restore_backup(7),
            Err(StorageError::InvalidData(_))
        ));

        let stats = store.stats().unwrap();
        assert!(stats.file_size > 0);
        assert_eq!(stats.backup_count, 3);
        assert_eq!(stats.latest.unwrap().wallet_count, 5);
    }

    #[test]
    fn test_backups_disabled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FactoryStore::new(StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
            backup_enabled: false,
            ..Default::default()
        })
        .unwrap();
        let (factory, _) = sample_factory();

        store.save(&factory).unwrap();
        store.save(&factory).unwrap();
        assert!(store.list_backups().is_empty());
    }

    #[test]
    fn test_delete_removes_backups() {
        let (_dir, store) = temp_store(5);
        let (factory, _) = sample_factory();

        store.save(&factory).unwrap();
        store.save(&factory).unwrap();
        assert_eq!(store.list_backups(), vec![0]);

        store.delete().unwrap();
        assert!(!store.exists());
        assert!(store.list_backups().is_empty());
        // Deleting twice is fine
        store.delete().unwrap();
    }

    #[test]
    fn test_export_import() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("export.json");
        let (factory, address) = sample_factory();

        let info = save_to_file(&factory, &path).unwrap();
        assert_eq!(info.wallet_count, 1);
        let imported = load_from_file(&path).unwrap();

        assert!(imported.is_wallet(&address));
        assert_eq!(imported.wallets_by_label("mama").len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_zero_quorum_snapshot_rejected() {
        let (_dir, store) = temp_store(5);
        let (factory, address) = sample_factory();

        tamper(&store, &factory, |value| {
            value["factory"]["wallets"][address.as_str()]["ledger"]["transactions"][0]
                ["quorum_required"] = json!(0);
        });

        assert!(matches!(
            store.load(),
            Err(StorageError::InvalidSnapshot(MultisigError::InvalidQuorum {
                quorum: 0,
                ..
            }))
        ));
    }

    #[test]
    fn test_foreign_approval_rejected() {
        let (_dir, store) = temp_store(5);
        let (factory, address) = sample_factory();

        tamper(&store, &factory, |value| {
            value["factory"]["wallets"][address.as_str()]["ledger"]["transactions"][0]
                ["approvals"][0]["owner"] = json!("mallory");
        });

        assert!(matches!(
            store.load(),
            Err(StorageError::InvalidSnapshot(MultisigError::NotAuthorized(_)))
        ));
    }

    #[test]
    fn test_duplicate_owner_rejected() {
        let (_dir, store) = temp_store(5);
        let (factory, address) = sample_factory();

        tamper(&store, &factory, |value| {
            value["factory"]["wallets"][address.as_str()]["owners"]["owners"] =
                json!(["alice", "alice"]);
        });

        assert!(matches!(
            store.load(),
            Err(StorageError::InvalidSnapshot(MultisigError::DuplicateOwner(_)))
        ));
    }

    #[test]
    fn test_header_checked() {
        let (_dir, store) = temp_store(5);
        let (factory, _) = sample_factory();

        tamper(&store, &factory, |value| value["version"] = json!(99));
        assert!(matches!(
            store.load(),
            Err(StorageError::UnsupportedVersion { found: 99, expected: 1 })
        ));
        assert!(matches!(
            store.stats(),
            Err(StorageError::UnsupportedVersion { .. })
        ));

        tamper(&store, &factory, |value| value["wallet_count"] = json!(4));
        assert!(matches!(store.load(), Err(StorageError::InvalidData(_))));
    }
}
