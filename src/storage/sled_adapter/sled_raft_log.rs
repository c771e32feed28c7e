//! It works as RAFT storage layer
//!
//! Reads are served from an in-memory index of the log. The index can be
//! trusted because every mutation goes through the sled tree first and the
//! index is refreshed in the same call, under the same lock.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::constants::RAFT_LOG_TREE;
use crate::protocol::Entry;
use crate::protocol::LogId;
use crate::utils::convert::index_to_key;
use crate::utils::convert::key_to_index;
use crate::RaftLog;
use crate::Result;
use crate::StorageError;

pub struct SledRaftLog {
    node_id: u32,
    tree: Arc<sled::Tree>,
    cache: RwLock<BTreeMap<u64, Entry>>,
}

impl std::fmt::Debug for SledRaftLog {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledRaftLog")
            .field("node_id", &self.node_id)
            .field("tree_len", &self.tree.len())
            .finish()
    }
}

impl Drop for SledRaftLog {
    fn drop(&mut self) {
        match self.flush() {
            Ok(_) => info!("Successfully flush RaftLog"),
            Err(e) => error!(?e, "Failed to flush RaftLog"),
        }
    }
}

impl SledRaftLog {
    /// Opens the raft log tree and rebuilds the in-memory index from disk.
    pub fn new(
        db: Arc<sled::Db>,
        node_id: u32,
    ) -> Result<Self> {
        let tree = db.open_tree(RAFT_LOG_TREE)?;

        let mut cache = BTreeMap::new();
        for kv in tree.iter() {
            let (key, value) = kv?;
            let index = key_to_index(&key)?;
            match bincode::deserialize::<Entry>(&value) {
                Ok(entry) => {
                    cache.insert(index, entry);
                }
                Err(e) => {
                    error!("undecodable raft log entry at index {}: {}", index, e);
                    return Err(StorageError::LogStorage(format!(
                        "undecodable raft log entry at index {}",
                        index
                    ))
                    .into());
                }
            }
        }
        debug!(
            "[Node-{}] raft log recovered, last index: {}",
            node_id,
            cache.keys().next_back().copied().unwrap_or(0)
        );

        Ok(Self {
            node_id,
            tree: Arc::new(tree),
            cache: RwLock::new(cache),
        })
    }
}

impl RaftLog for SledRaftLog {
    fn entry(
        &self,
        index: u64,
    ) -> Result<Option<Entry>> {
        Ok(self.cache.read().get(&index).cloned())
    }

    fn entry_term(
        &self,
        index: u64,
    ) -> Option<u64> {
        self.cache.read().get(&index).map(|entry| entry.term)
    }

    fn last_index(&self) -> u64 {
        self.cache.read().keys().next_back().copied().unwrap_or(0)
    }

    fn last_log_id(&self) -> Option<LogId> {
        self.cache
            .read()
            .values()
            .next_back()
            .map(|entry| entry.log_id())
    }

    fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn get_entries_between(
        &self,
        range: RangeInclusive<u64>,
    ) -> Vec<Entry> {
        self.cache.read().range(range).map(|(_, entry)| entry.clone()).collect()
    }

    fn append(
        &self,
        term: u64,
        command: Vec<u8>,
    ) -> Result<Entry> {
        let mut cache = self.cache.write();
        let index = cache.keys().next_back().copied().unwrap_or(0) + 1;
        let entry = Entry { index, term, command };

        self.tree.insert(index_to_key(index), bincode::serialize(&entry)?)?;
        self.tree.flush()?;
        cache.insert(index, entry.clone());

        Ok(entry)
    }

    fn append_entries(
        &self,
        entries: Vec<Entry>,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut cache = self.cache.write();
        let mut batch = sled::Batch::default();
        for entry in &entries {
            batch.insert(index_to_key(entry.index).to_vec(), bincode::serialize(entry)?);
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        for entry in entries {
            cache.insert(entry.index, entry);
        }

        Ok(())
    }

    fn truncate_from(
        &self,
        index: u64,
    ) -> Result<()> {
        let mut cache = self.cache.write();
        let removed = cache.split_off(&index);
        if removed.is_empty() {
            return Ok(());
        }
        debug!(
            "[Node-{}] truncating raft log from index {} ({} entries)",
            self.node_id,
            index,
            removed.len()
        );

        let mut batch = sled::Batch::default();
        for removed_index in removed.keys() {
            batch.remove(index_to_key(*removed_index).to_vec());
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;

        Ok(())
    }

    fn filter_out_conflicts_and_append(
        &self,
        prev_log_index: u64,
        new_entries: Vec<Entry>,
    ) -> Result<u64> {
        let last_new_index = prev_log_index + new_entries.len() as u64;

        let mut cache = self.cache.write();
        let mut batch = sled::Batch::default();
        let mut appended = Vec::new();
        for entry in new_entries {
            match cache.get(&entry.index).map(|existing| existing.term) {
                // Already holds a matching entry, keep it
                Some(existing_term) if existing_term == entry.term => continue,
                Some(existing_term) => {
                    // Conflicting suffix, drop everything from here on
                    warn!(
                        "[Node-{}] log conflict at index {}: local term {} vs leader term {}",
                        self.node_id, entry.index, existing_term, entry.term
                    );
                    let removed = cache.split_off(&entry.index);
                    for removed_index in removed.keys() {
                        batch.remove(index_to_key(*removed_index).to_vec());
                    }
                    batch.insert(index_to_key(entry.index).to_vec(), bincode::serialize(&entry)?);
                    appended.push(entry);
                }
                None => {
                    batch.insert(index_to_key(entry.index).to_vec(), bincode::serialize(&entry)?);
                    appended.push(entry);
                }
            }
        }

        if !appended.is_empty() {
            self.tree.apply_batch(batch)?;
            self.tree.flush()?;
            for entry in appended {
                cache.insert(entry.index, entry);
            }
        }

        Ok(last_new_index)
    }

    fn calculate_majority_matched_index(
        &self,
        current_term: u64,
        commit_index: u64,
        mut peer_matched_ids: Vec<u64>,
    ) -> Option<u64> {
        // Include leader's last index
        peer_matched_ids.push(self.last_index());

        // Sort in descending order
        peer_matched_ids.sort_unstable_by(|a, b| b.cmp(a));

        // Calculate median as majority index
        let majority_matched_index = peer_matched_ids[peer_matched_ids.len() / 2];

        debug!(
            "Majority calculation: matched={:?}, majority_matched_index={}",
            peer_matched_ids, majority_matched_index,
        );

        // Commit only advances
        if majority_matched_index <= commit_index {
            return None;
        }

        // Check term consistency: only entries of the current term commit by counting
        match self.entry_term(majority_matched_index) {
            Some(term) if term == current_term => Some(majority_matched_index),
            _ => None,
        }
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        let mut cache = self.cache.write();
        self.tree.clear().map_err(|e| {
            error!("raft log reset failed: {}", e);
            StorageError::DbError(e.to_string())
        })?;
        self.tree.flush()?;
        cache.clear();

        Ok(())
    }

    fn len(&self) -> usize {
        self.cache.read().len()
    }
}
