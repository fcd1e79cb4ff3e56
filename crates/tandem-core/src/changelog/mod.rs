//! Changelog: the version graph.
//!
//! Every operation appended to the changelog produces a new version whose
//! parent is the version it was appended to. Versions are immutable once
//! created.

mod operation;
mod version;

pub use operation::{DataOperation, Operation, OperationKind};
pub use version::{ChangeSet, Version, VersionId};

use crate::error::Error;
use crate::ids::{self, current_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The changelog of a database.
///
/// Deserializing checks that the root and the last added version exist and
/// that every parent and child link resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChangelog")]
pub struct Changelog {
    root: VersionId,
    last_added: VersionId,
    versions: BTreeMap<VersionId, Version>,
    change_sets: BTreeMap<String, ChangeSet>,
}

/// Serialized form of [`Changelog`], before its links are checked.
#[derive(Deserialize)]
struct RawChangelog {
    root: VersionId,
    last_added: VersionId,
    versions: BTreeMap<VersionId, Version>,
    change_sets: BTreeMap<String, ChangeSet>,
}

impl TryFrom<RawChangelog> for Changelog {
    type Error = Error;

    fn try_from(raw: RawChangelog) -> Result<Self, Error> {
        let broken = |what: String| Error::InvalidData(format!("corrupt changelog: {what}"));
        match raw.versions.get(&raw.root) {
            Some(root) if root.parent.is_none() => {}
            Some(_) => return Err(broken(format!("root {} has a parent", raw.root))),
            None => return Err(broken(format!("root {} is missing", raw.root))),
        }
        if !raw.versions.contains_key(&raw.last_added) {
            return Err(broken(format!("last added version {} is missing", raw.last_added)));
        }
        for (id, version) in &raw.versions {
            if &version.id != id {
                return Err(broken(format!("version {} stored under {}", version.id, id)));
            }
            for link in version.parent.iter().chain(version.child.iter()) {
                if !raw.versions.contains_key(link) {
                    return Err(broken(format!("version {id} links to missing version {link}")));
                }
            }
        }
        Ok(Self {
            root: raw.root,
            last_added: raw.last_added,
            versions: raw.versions,
            change_sets: raw.change_sets,
        })
    }
}

impl Changelog {
    /// Create a changelog holding only a root version.
    pub fn new() -> Self {
        let change_set = ChangeSet {
            id: ids::generate("cs_", |_| false),
            author: "tandem".to_string(),
            description: Some("Initial state of the database".to_string()),
            created_at: current_timestamp(),
        };
        let root = VersionId::new(ids::generate("", |_| false));
        let version = Version {
            id: root.clone(),
            parent: None,
            child: None,
            operation: None,
            change_set: change_set.id.clone(),
        };

        let mut versions = BTreeMap::new();
        versions.insert(root.clone(), version);
        let mut change_sets = BTreeMap::new();
        change_sets.insert(change_set.id.clone(), change_set);

        Self {
            last_added: root.clone(),
            root,
            versions,
            change_sets,
        }
    }

    /// The root version.
    pub fn root(&self) -> &Version {
        &self.versions[&self.root]
    }

    /// The most recently appended version.
    pub fn last_added(&self) -> &Version {
        &self.versions[&self.last_added]
    }

    /// Look up a version.
    pub fn version(&self, id: &VersionId) -> Result<&Version, Error> {
        self.versions
            .get(id)
            .ok_or_else(|| Error::UnknownVersion(id.to_string()))
    }

    /// Check if the version exists.
    pub fn contains(&self, id: &VersionId) -> bool {
        self.versions.contains_key(id)
    }

    /// Look up a change set.
    pub fn change_set(&self, id: &str) -> Option<&ChangeSet> {
        self.change_sets.get(id)
    }

    /// Append a change set after the most recently added version. Returns
    /// the ids of the created versions in order.
    pub fn add_change_set(
        &mut self,
        author: impl Into<String>,
        description: Option<String>,
        operations: Vec<Operation>,
    ) -> Result<Vec<VersionId>, Error> {
        if operations.is_empty() {
            return Err(Error::InvalidData(
                "a change set needs at least one operation".to_string(),
            ));
        }

        let change_set = ChangeSet {
            id: ids::generate("cs_", |id| self.change_sets.contains_key(id)),
            author: author.into(),
            description,
            created_at: current_timestamp(),
        };

        let mut created = Vec::with_capacity(operations.len());
        for operation in operations {
            let parent = self.last_added.clone();
            let id = VersionId::new(ids::generate("", |id| {
                self.versions.contains_key(&VersionId::from(id))
            }));
            let version = Version {
                id: id.clone(),
                parent: Some(parent.clone()),
                child: None,
                operation: Some(operation),
                change_set: change_set.id.clone(),
            };
            if let Some(parent) = self.versions.get_mut(&parent) {
                parent.child = Some(id.clone());
            }
            self.versions.insert(id.clone(), version);
            self.last_added = id.clone();
            created.push(id);
        }

        self.change_sets.insert(change_set.id.clone(), change_set);
        Ok(created)
    }

    /// The path of versions from `from` to `to` following child pointers,
    /// both ends included. `None` if `to` is not a descendant of `from`.
    pub fn find_child_path(&self, from: &VersionId, to: &VersionId) -> Option<Vec<VersionId>> {
        let mut path = vec![from.clone()];
        let mut current = self.versions.get(from)?;
        while &current.id != to {
            let child = current.child.as_ref()?;
            current = self.versions.get(child)?;
            path.push(current.id.clone());
        }
        Some(path)
    }

    /// All versions from the root along child pointers.
    pub fn chain(&self) -> Vec<VersionId> {
        let mut chain = vec![self.root.clone()];
        let mut current = self.root();
        while let Some(child) = current.child.as_ref().and_then(|c| self.versions.get(c)) {
            chain.push(child.id.clone());
            current = child;
        }
        chain
    }

    /// The version and its consecutive ancestors that belong to the same
    /// change set, newest first.
    pub fn change_set_run(&self, id: &VersionId) -> Result<Vec<VersionId>, Error> {
        let version = self.version(id)?;
        let mut run = vec![version.id.clone()];
        let mut current = version;
        while let Some(parent) = current.parent.as_ref().and_then(|p| self.versions.get(p)) {
            if parent.change_set != version.change_set {
                break;
            }
            run.push(parent.id.clone());
            current = parent;
        }
        Ok(run)
    }
}

impl Default for Changelog {
    fn default() -> Self {
        Self::new()
    }
}
