use rocksdb::{DB, Options};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info, warn};

use crate::models::errors::CheckpointError;

/// Bumped whenever the record layout changes so older progress is discarded.
pub const SCHEMA_VERSION: u64 = 3;

const DATA_VERSION_KEY: &str = "dataVersion";
const LAST_BLOCK_KEY: &str = "lastBlock";

/// Persistent resume point of the indexer.
///
/// Both keys hold a little-endian `u64`.
pub struct CheckpointStore {
    db: DB,
}

impl CheckpointStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Last fully processed block, or 0 when nothing valid is stored.
    ///
    /// A missing or outdated schema version resets progress and writes the current version.
    /// Unreadable values are treated the same way.
    pub fn get_last_block(&self) -> u64 {
        match self.read_u64(DATA_VERSION_KEY) {
            Ok(Some(version)) if version >= SCHEMA_VERSION => {}
            Ok(Some(version)) => {
                info!(
                    "Checkpoint schema version {} is older than {}, starting from block 0",
                    version, SCHEMA_VERSION
                );
                self.reset();
                return 0;
            }
            Ok(None) => {
                info!("No checkpoint found, starting from block 0");
                self.reset();
                return 0;
            }
            Err(e) => {
                error!("Failed to read checkpoint schema version: {}", e);
                self.reset();
                return 0;
            }
        }

        match self.read_u64(LAST_BLOCK_KEY) {
            Ok(last_block) => last_block.unwrap_or_default(),
            Err(e) => {
                error!("Failed to read last processed block: {}", e);
                self.reset();
                0
            }
        }
    }

    pub fn set_last_block(&self, block: u64) -> Result<(), CheckpointError> {
        self.db.put(LAST_BLOCK_KEY, block.to_le_bytes())?;
        Ok(())
    }

    /// Persist `block` only when it is above the stored value. Returns whether it was written.
    pub fn advance_last_block(&self, block: u64) -> Result<bool, CheckpointError> {
        let stored = match self.read_u64(LAST_BLOCK_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Overwriting unreadable checkpoint: {}", e);
                None
            }
        };
        if stored.is_some_and(|stored| stored >= block) {
            return Ok(false);
        }

        self.set_last_block(block)?;
        Ok(true)
    }

    fn reset(&self) {
        let result = self
            .db
            .put(DATA_VERSION_KEY, SCHEMA_VERSION.to_le_bytes())
            .and_then(|_| self.db.put(LAST_BLOCK_KEY, 0u64.to_le_bytes()));
        if let Err(e) = result {
            warn!("Failed to persist checkpoint reset: {}", e);
        }
    }

    fn read_u64(&self, key: &'static str) -> Result<Option<u64>, CheckpointError> {
        match self.db.get(key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CheckpointError::InvalidValue {
                        key,
                        len: bytes.len(),
                    })?;
                Ok(Some(u64::from_le_bytes(raw)))
            }
            None => Ok(None),
        }
    }
}

/// Tracks out-of-order block completions and reports the highest block below which
/// everything has completed.
#[derive(Debug, Clone)]
pub struct ContiguousCheckpoint {
    next: u64,
    completed: BTreeSet<u64>,
}

impl ContiguousCheckpoint {
    pub fn new(resume_from: u64) -> Self {
        Self {
            next: resume_from,
            completed: BTreeSet::new(),
        }
    }

    /// Mark `block` complete. Returns the new highest contiguous completed block when it moved.
    pub fn complete(&mut self, block: u64) -> Option<u64> {
        if block < self.next {
            return None;
        }
        self.completed.insert(block);

        let mut advanced = None;
        while self.completed.remove(&self.next) {
            advanced = Some(self.next);
            self.next += 1;
        }
        advanced
    }

    /// Lowest block not yet completed.
    pub fn next(&self) -> u64 {
        self.next
    }

    pub fn pending_completions(&self) -> usize {
        self.completed.len()
    }
}
