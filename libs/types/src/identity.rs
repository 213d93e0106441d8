//! Participant identity pool
//!
//! Every simulated participant is addressed by an index; the identity string
//! at that index is what senders stamp into outgoing envelopes and what
//! receivers use to recognize (and skip) their own traffic.

use crate::{PoolError, Result};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Slice of the identity pool owned by one harness instance
///
/// With `N` participants per shard, shard `k` owns pool indices
/// `[k * N, (k + 1) * N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shard {
    pub ordinal: usize,
    pub participants_per_shard: usize,
}

impl Shard {
    pub fn new(ordinal: usize, participants_per_shard: usize) -> Self {
        Self {
            ordinal,
            participants_per_shard,
        }
    }

    /// Pool index of local participant `idx`
    pub fn real_index(&self, idx: usize) -> usize {
        idx + self.ordinal * self.participants_per_shard
    }
}

/// Ordered set of unique participant identifiers
#[derive(Debug, Default)]
pub struct IdentityPool {
    block: OnceCell<Vec<String>>,
}

impl IdentityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt `ids` verbatim; no-op if the pool is already initialized
    pub fn init_from_list(&self, ids: Vec<String>) -> Result<()> {
        self.block
            .get_or_try_init(|| {
                if ids.is_empty() {
                    return Err(PoolError::invalid_argument("identity list is empty"));
                }
                info!("Identity pool initialized from list ({} ids)", ids.len());
                Ok(ids)
            })
            .map(|_| ())
    }

    /// Adopt the non-blank lines of `reader`
    pub fn init_from_reader<R: BufRead>(&self, reader: R) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.init_from_list(crate::read_lines_from(reader)?)
    }

    /// Adopt the non-blank lines of the file at `path`
    pub fn init_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.init_from_list(crate::read_lines(path)?)
    }

    /// Generate `count` unique random identifiers; no-op if already initialized
    pub fn init_generated(&self, count: usize) -> Result<()> {
        self.block
            .get_or_try_init(|| {
                if count == 0 {
                    return Err(PoolError::invalid_argument("id count is 0"));
                }

                let mut seen = HashSet::with_capacity(count);
                let mut ids = Vec::with_capacity(count);
                while ids.len() < count {
                    let id = Uuid::new_v4().to_string();
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }

                info!("Identity pool generated ({} ids)", count);
                Ok(ids)
            })
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.block.get().is_some()
    }

    /// Number of identities, zero before initialization
    pub fn count(&self) -> usize {
        self.block.get().map_or(0, Vec::len)
    }

    /// All identities in pool order
    pub fn identities(&self) -> &[String] {
        self.block.get().map_or(&[], Vec::as_slice)
    }

    /// Identity of local participant `idx` within `shard`
    ///
    /// Returns the shard-adjusted pool index together with the identity.
    pub fn identity_at(&self, idx: usize, shard: Shard) -> Result<(usize, &str)> {
        let block = self
            .block
            .get()
            .ok_or(PoolError::NotInitialized { pool: "identity" })?;

        let real_index = shard.real_index(idx);
        block
            .get(real_index)
            .map(|id| (real_index, id.as_str()))
            .ok_or(PoolError::IndexOutOfRange {
                index: idx,
                real_index,
                count: block.len(),
            })
    }
}
