//! Storage module for factory snapshots

pub mod persistence;

pub use persistence::{
    load_from_file, save_to_file, FactoryStore, SnapshotInfo, StorageError, StorageStats,
    StoreConfig, SNAPSHOT_VERSION,
};
