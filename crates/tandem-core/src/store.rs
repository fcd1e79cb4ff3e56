//! Durable storage of the schema state.

use crate::error::Error;
use crate::migrator::PendingMigration;
use crate::state::State;

/// Keeps the serialized [`State`] of a database in a sled tree.
pub struct StateStore {
    tree: sled::Tree,
}

impl StateStore {
    /// Tree name for the schema state.
    pub const TREE_NAME: &'static str = "tandem:state";

    const STATE_KEY: &'static [u8] = b"state";
    const PENDING_KEY: &'static [u8] = b"pending";

    /// Open or create the state store.
    pub fn open(db: &sled::Db) -> Result<Self, Error> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Replace the stored state.
    pub fn save(&self, state: &State) -> Result<(), Error> {
        let value = state.to_bytes()?;
        self.tree.insert(Self::STATE_KEY, value)?;
        Ok(())
    }

    /// Load the stored state, if any.
    pub fn load(&self) -> Result<Option<State>, Error> {
        match self.tree.get(Self::STATE_KEY)? {
            Some(bytes) => Ok(Some(State::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store the state and remove the pending migration in one batch.
    pub fn commit(&self, state: &State) -> Result<(), Error> {
        let mut batch = sled::Batch::default();
        batch.insert(Self::STATE_KEY, state.to_bytes()?);
        batch.remove(Self::PENDING_KEY);
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    /// Record the progress of a schema migration.
    pub fn save_pending(&self, pending: &PendingMigration) -> Result<(), Error> {
        let value = serde_json::to_vec(pending).map_err(|e| Error::Serialization(e.to_string()))?;
        self.tree.insert(Self::PENDING_KEY, value)?;
        Ok(())
    }

    /// The schema migration in progress, if any.
    pub fn load_pending(&self) -> Result<Option<PendingMigration>, Error> {
        match self.tree.get(Self::PENDING_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Forget the schema migration in progress.
    pub fn clear_pending(&self) -> Result<(), Error> {
        self.tree.remove(Self::PENDING_KEY)?;
        Ok(())
    }

    /// Remove the stored state.
    pub fn clear(&self) -> Result<(), Error> {
        self.tree.remove(Self::STATE_KEY)?;
        Ok(())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.tree.flush()?;
        Ok(())
    }
}
