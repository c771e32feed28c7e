//! Durable key-value state machine on top of sled.
//!
//! Every key-value mutation of an apply round and the matching last-applied
//! marker land in one sled batch, so a crash between rounds can only be
//! observed as "round fully applied" or "round not applied". Combined with
//! the index skip in [`apply_batch`](crate::StateMachine::apply_batch) this
//! keeps non-idempotent commands (list appends) applied exactly once.
//!
//! Keys prefixed with `_raft` are reserved for engine metadata.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::STATE_MACHINE_META_KEY_LAST_APPLIED_INDEX;
use crate::constants::STATE_MACHINE_TREE;
use crate::protocol::Command;
use crate::protocol::Entry;
use crate::utils::convert::key_to_index;
use crate::Result;
use crate::StateMachine;

/// Reserved key namespace inside the state machine tree
const META_PREFIX: &[u8] = b"_raft";

pub struct SledStateMachine {
    node_id: u32,
    tree: Arc<sled::Tree>,
    last_applied: AtomicU64,
}

impl std::fmt::Debug for SledStateMachine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledStateMachine")
            .field("node_id", &self.node_id)
            .field("last_applied", &self.last_applied.load(Ordering::Acquire))
            .finish()
    }
}

impl SledStateMachine {
    /// Opens the state machine tree and recovers the last applied index.
    pub fn new(
        db: Arc<sled::Db>,
        node_id: u32,
    ) -> Result<Self> {
        let tree = db.open_tree(STATE_MACHINE_TREE)?;

        let last_applied = match tree.get(STATE_MACHINE_META_KEY_LAST_APPLIED_INDEX)? {
            Some(raw) => key_to_index(&raw)?,
            None => 0,
        };
        debug!(
            "[Node-{}] state machine recovered, last applied index: {}",
            node_id, last_applied
        );

        Ok(Self {
            node_id,
            tree: Arc::new(tree),
            last_applied: AtomicU64::new(last_applied),
        })
    }

    /// Current value for `key`, consulting uncommitted writes of the running
    /// apply round first so a chunk observes its own earlier mutations.
    fn read_through(
        &self,
        overlay: &HashMap<Vec<u8>, Option<Vec<u8>>>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = overlay.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.tree.get(key)?.map(|ivec| ivec.to_vec()))
    }
}

impl StateMachine for SledStateMachine {
    fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn apply_batch(
        &self,
        chunk: Vec<Entry>,
    ) -> Result<()> {
        let already_applied = self.last_applied.load(Ordering::Acquire);

        let mut batch = sled::Batch::default();
        let mut overlay: HashMap<Vec<u8>, Option<Vec<u8>>> = HashMap::new();
        let mut highest_applied = already_applied;

        for entry in chunk {
            if entry.index <= already_applied {
                trace!(
                    "[Node-{}] skip re-apply of entry {} (last applied {})",
                    self.node_id,
                    entry.index,
                    already_applied
                );
                continue;
            }

            match Command::decode(&entry.command) {
                Ok(Command::Put { key, value }) => {
                    let key = key.into_bytes();
                    batch.insert(key.clone(), value.clone());
                    overlay.insert(key, Some(value));
                }
                Ok(Command::Delete { key }) => {
                    let key = key.into_bytes();
                    batch.remove(key.clone());
                    overlay.insert(key, None);
                }
                Ok(Command::Append { key, item }) => {
                    let key = key.into_bytes();
                    let mut items: Vec<Vec<u8>> = match self.read_through(&overlay, &key)? {
                        Some(raw) => bincode::deserialize(&raw)?,
                        None => Vec::new(),
                    };
                    items.push(item);
                    let raw = bincode::serialize(&items)?;
                    batch.insert(key.clone(), raw.clone());
                    overlay.insert(key, Some(raw));
                }
                Err(e) => {
                    // Committed garbage must not wedge the applier. Skipping is
                    // deterministic: every node sees the same bytes.
                    warn!(
                        "[Node-{}] undecodable command at index {}: {}",
                        self.node_id, entry.index, e
                    );
                }
            }
            highest_applied = entry.index;
        }

        if highest_applied == already_applied {
            return Ok(());
        }

        batch.insert(
            STATE_MACHINE_META_KEY_LAST_APPLIED_INDEX,
            highest_applied.to_be_bytes().to_vec(),
        );
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        self.last_applied.store(highest_applied, Ordering::Release);

        Ok(())
    }

    fn last_applied(&self) -> u64 {
        self.last_applied.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.tree
            .iter()
            .keys()
            .filter_map(|key| key.ok())
            .filter(|key| !key.starts_with(META_PREFIX))
            .count()
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}
