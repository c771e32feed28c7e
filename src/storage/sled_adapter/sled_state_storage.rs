use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;

use crate::constants::STATE_STORAGE_HARD_STATE_KEY;
use crate::constants::STATE_STORAGE_TREE;
use crate::HardState;
use crate::Result;
use crate::StateStorage;

#[derive(Clone)]
pub struct SledStateStorage {
    tree: Arc<sled::Tree>,
}

impl std::fmt::Debug for SledStateStorage {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledStateStorage")
            .field("tree_len", &self.tree.len())
            .finish()
    }
}

impl SledStateStorage {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        let tree = db.open_tree(STATE_STORAGE_TREE)?;
        Ok(Self { tree: Arc::new(tree) })
    }
}

impl StateStorage for SledStateStorage {
    fn get(
        &self,
        key: Vec<u8>,
    ) -> Result<Option<Vec<u8>>> {
        match self.tree.get(key)? {
            Some(ivec) => Ok(Some(ivec.to_vec())),
            None => Ok(None),
        }
    }

    fn insert(
        &self,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<Option<Vec<u8>>> {
        match self.tree.insert(key, value)? {
            Some(ivec) => Ok(Some(ivec.to_vec())),
            None => Ok(None),
        }
    }

    fn flush(&self) -> Result<usize> {
        Ok(self.tree.flush()?)
    }

    fn load_hard_state(&self) -> Option<HardState> {
        match self.get(STATE_STORAGE_HARD_STATE_KEY.as_bytes().to_vec()) {
            Ok(Some(raw)) => match bincode::deserialize::<HardState>(&raw) {
                Ok(hard_state) => {
                    info!(
                        "loaded hard state: current_term={}, voted_for={:?}",
                        hard_state.current_term, hard_state.voted_for
                    );
                    Some(hard_state)
                }
                Err(e) => {
                    error!("hard state deserialize error: {}", e);
                    None
                }
            },
            Ok(None) => {
                debug!("no hard state found with key: {}", STATE_STORAGE_HARD_STATE_KEY);
                None
            }
            Err(e) => {
                error!("hard state load error: {}", e);
                None
            }
        }
    }

    fn save_hard_state(
        &self,
        hard_state: HardState,
    ) -> Result<()> {
        let raw = bincode::serialize(&hard_state)?;
        self.insert(STATE_STORAGE_HARD_STATE_KEY.as_bytes().to_vec(), raw)?;

        // Dependent messages may only leave this node once the state is on disk
        self.flush()?;

        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tree.len()
    }
}
