use std::sync::Arc;

use crate::protocol::Command;
use crate::Node;
use crate::Result;
use crate::TypeConfig;

/// A replicated map of string keys to byte values.
///
/// Keys are namespaced per collection, so independent dictionaries share one
/// cluster without colliding. Writes resolve once the entry is committed on
/// the leader; reads come from the local applied state and may lag briefly
/// behind an acknowledged write.
pub struct ReplicatedDict<T>
where T: TypeConfig
{
    node: Arc<Node<T>>,
    namespace: String,
}

impl<T> ReplicatedDict<T>
where T: TypeConfig
{
    pub fn new(
        node: Arc<Node<T>>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            node,
            namespace: namespace.into(),
        }
    }

    /// Replicates `value` under `key`.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.node
            .propose(Command::Put {
                key: self.storage_key(key),
                value: value.into(),
            })
            .await?;
        Ok(())
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.node.get(self.storage_key(key).as_bytes())
    }

    /// Removes `key`. Committed like any other write.
    pub async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.node
            .propose(Command::Delete {
                key: self.storage_key(key),
            })
            .await?;
        Ok(())
    }

    fn storage_key(
        &self,
        key: &str,
    ) -> String {
        format!("{}.{}", self.namespace, key)
    }
}

/// A replicated append-only list of byte items.
pub struct ReplicatedList<T>
where T: TypeConfig
{
    node: Arc<Node<T>>,
    name: String,
}

impl<T> ReplicatedList<T>
where T: TypeConfig
{
    pub fn new(
        node: Arc<Node<T>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }

    /// Appends `item` to the end of the list.
    pub async fn push(
        &self,
        item: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.node
            .propose(Command::Append {
                key: self.name.clone(),
                item: item.into(),
            })
            .await?;
        Ok(())
    }

    /// Reads the whole list from the local applied state.
    pub fn read(&self) -> Result<Vec<Vec<u8>>> {
        match self.node.get(self.name.as_bytes())? {
            Some(raw) => Ok(bincode::deserialize(&raw)?),
            None => Ok(Vec::new()),
        }
    }
}
