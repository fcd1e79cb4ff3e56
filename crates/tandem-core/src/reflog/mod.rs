//! Ref log: which physical table or view backs a logical name at each
//! version.
//!
//! A logical name maps to exactly one table ref per version. Ghosting a
//! table for a version moves that version from the old ref to a new one and
//! records the lineage between them, column by column. The lineage is what
//! data copies and synchronizers follow.

mod refs;

pub use refs::{ColumnKey, ColumnMapping, ColumnRef, SyncDirection, SyncRef, TableRef, ViewRef};

use crate::changelog::{Version, VersionId};
use crate::error::Error;
use crate::ids;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Prefix of generated table ref-ids.
pub const TABLE_PREFIX: &str = "table_";
/// Prefix of generated view ref-ids.
pub const VIEW_PREFIX: &str = "view_";

/// The ref log of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefLog {
    tables: BTreeMap<String, TableRef>,
    views: BTreeMap<String, ViewRef>,
    syncs: BTreeMap<String, SyncRef>,
    active_versions: BTreeSet<VersionId>,
}

impl RefLog {
    /// Create an empty ref log.
    pub fn new() -> Self {
        Self::default()
    }

    // ----- tables -----

    /// Register a table ref visible at a single version.
    pub fn add_table<I, S>(
        &mut self,
        name: &str,
        ref_id: &str,
        version: &VersionId,
        columns: I,
    ) -> Result<&TableRef, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_ref_id_free(ref_id)?;
        self.check_name_free(name, version)?;
        let columns = columns
            .into_iter()
            .map(|c| {
                let column = ColumnRef::new(c);
                (column.name.clone(), column)
            })
            .collect();
        let table = TableRef {
            name: name.to_string(),
            ref_id: ref_id.to_string(),
            versions: BTreeSet::from([version.clone()]),
            columns,
            based_on: BTreeSet::new(),
        };
        self.tables.insert(ref_id.to_string(), table);
        self.table_ref_by_id(ref_id)
    }

    /// The table ref backing a logical name at a version.
    pub fn table_ref(&self, version: &VersionId, name: &str) -> Result<&TableRef, Error> {
        self.tables
            .values()
            .find(|t| t.name == name && t.is_at(version))
            .ok_or_else(|| Error::UnknownTableRef {
                version: version.to_string(),
                name: name.to_string(),
            })
    }

    /// Look up a table ref by ref-id.
    pub fn table_ref_by_id(&self, ref_id: &str) -> Result<&TableRef, Error> {
        self.tables
            .get(ref_id)
            .ok_or_else(|| Error::UnknownRefId(ref_id.to_string()))
    }

    fn table_ref_mut(&mut self, ref_id: &str) -> Result<&mut TableRef, Error> {
        self.tables
            .get_mut(ref_id)
            .ok_or_else(|| Error::UnknownRefId(ref_id.to_string()))
    }

    /// Check if a table ref exists.
    pub fn contains_table_ref(&self, ref_id: &str) -> bool {
        self.tables.contains_key(ref_id)
    }

    /// All table refs.
    pub fn table_refs(&self) -> impl Iterator<Item = &TableRef> {
        self.tables.values()
    }

    /// Table refs visible at a version.
    pub fn table_refs_at<'a>(
        &'a self,
        version: &'a VersionId,
    ) -> impl Iterator<Item = &'a TableRef> + 'a {
        self.tables.values().filter(move |t| t.is_at(version))
    }

    /// Ref-ids of the table refs visible at a version.
    pub fn ref_ids_at(&self, version: &VersionId) -> BTreeSet<String> {
        self.table_refs_at(version).map(|t| t.ref_id.clone()).collect()
    }

    /// Logical name to ref-id of every table and view visible at a version.
    pub fn name_mapping(&self, version: &VersionId) -> BTreeMap<String, String> {
        self.table_refs_at(version)
            .map(|t| (t.name.clone(), t.ref_id.clone()))
            .chain(
                self.view_refs_at(version)
                    .map(|v| (v.name.clone(), v.ref_id.clone())),
            )
            .collect()
    }

    /// Make every ref visible at the parent of `version` visible at
    /// `version` too.
    pub fn fork(&mut self, version: &Version) -> Result<(), Error> {
        let parent = version.parent.as_ref().ok_or_else(|| {
            Error::InvalidData(format!("cannot fork root version {}", version.id))
        })?;
        for table in self.tables.values_mut() {
            if table.versions.contains(parent) {
                table.versions.insert(version.id.clone());
            }
        }
        for view in self.views.values_mut() {
            if view.versions.contains(parent) {
                view.versions.insert(version.id.clone());
            }
        }
        Ok(())
    }

    /// Replace the table backing `ref_id`'s name at `version` by a new
    /// physical table `new_ref_id` derived from it.
    pub fn ghost_table(
        &mut self,
        ref_id: &str,
        new_ref_id: &str,
        version: &VersionId,
    ) -> Result<&TableRef, Error> {
        self.check_ref_id_free(new_ref_id)?;
        let old = self.table_ref_mut(ref_id)?;
        if !old.versions.remove(version) {
            return Err(Error::InvalidData(format!(
                "{ref_id} is not visible at version {version}"
            )));
        }

        let mut columns = BTreeMap::new();
        for (name, column) in old.columns.iter_mut() {
            column.basis_for.insert(ColumnKey::new(new_ref_id, name.clone()));
            let mut ghost = ColumnRef::new(name.clone());
            ghost.based_on.insert(ColumnKey::new(ref_id, name.clone()));
            columns.insert(name.clone(), ghost);
        }
        let ghost = TableRef {
            name: old.name.clone(),
            ref_id: new_ref_id.to_string(),
            versions: BTreeSet::from([version.clone()]),
            columns,
            based_on: BTreeSet::from([ref_id.to_string()]),
        };
        self.tables.insert(new_ref_id.to_string(), ghost);
        self.table_ref_by_id(new_ref_id)
    }

    /// Register a copy of `source` under a new name at a single version.
    /// Every column of the copy is derived from the column of the source.
    pub fn copy_table(
        &mut self,
        source: &str,
        name: &str,
        new_ref_id: &str,
        version: &VersionId,
    ) -> Result<&TableRef, Error> {
        let columns: Vec<String> = self.table_ref_by_id(source)?.columns.keys().cloned().collect();
        self.add_table(name, new_ref_id, version, columns.iter().cloned())?;
        for column in &columns {
            self.link_columns(
                &ColumnKey::new(source, column.clone()),
                &ColumnKey::new(new_ref_id, column.clone()),
            )?;
        }
        self.table_ref_mut(new_ref_id)?
            .based_on
            .insert(source.to_string());
        self.table_ref_by_id(new_ref_id)
    }

    /// Change the logical name of a ref. The new name must be free at every
    /// version the ref is visible at.
    pub fn rename_table(&mut self, ref_id: &str, new_name: &str) -> Result<(), Error> {
        let versions = self.table_ref_by_id(ref_id)?.versions.clone();
        for version in &versions {
            self.check_name_free(new_name, version)?;
        }
        self.table_ref_mut(ref_id)?.name = new_name.to_string();
        Ok(())
    }

    /// Hide a table ref at a version.
    pub fn remove_version(&mut self, ref_id: &str, version: &VersionId) -> Result<(), Error> {
        self.table_ref_mut(ref_id)?.versions.remove(version);
        Ok(())
    }

    /// Remove a table ref with its column lineage and synchronizers.
    pub fn drop_table(&mut self, ref_id: &str) -> Result<TableRef, Error> {
        let removed = self
            .tables
            .remove(ref_id)
            .ok_or_else(|| Error::UnknownRefId(ref_id.to_string()))?;
        for table in self.tables.values_mut() {
            table.based_on.remove(ref_id);
            for column in table.columns.values_mut() {
                column.based_on.retain(|k| k.table != ref_id);
                column.basis_for.retain(|k| k.table != ref_id);
            }
        }
        self.syncs
            .retain(|_, s| s.source != ref_id && s.target != ref_id);
        Ok(removed)
    }

    /// The ref visible at `version` that `ref_id` is or evolved into.
    /// Prefers a descendant that kept the logical name.
    pub fn descendant_at(&self, ref_id: &str, version: &VersionId) -> Option<&TableRef> {
        let start = self.tables.get(ref_id)?;
        if start.is_at(version) {
            return Some(start);
        }
        let mut found: Vec<&TableRef> = Vec::new();
        let mut seen = BTreeSet::from([ref_id.to_string()]);
        let mut queue = VecDeque::from([ref_id.to_string()]);
        while let Some(current) = queue.pop_front() {
            for table in self.tables.values() {
                if table.based_on.contains(&current) && seen.insert(table.ref_id.clone()) {
                    if table.is_at(version) {
                        found.push(table);
                    }
                    queue.push_back(table.ref_id.clone());
                }
            }
        }
        found
            .iter()
            .find(|t| t.name == start.name)
            .or_else(|| found.first())
            .copied()
    }

    /// Pairs `(old, new)` of ref-ids where `new` is visible at `to` but not
    /// at `from`, and was derived from `old` which is visible at `from`.
    pub fn table_mapping(&self, from: &VersionId, to: &VersionId) -> Vec<(String, String)> {
        let origin = self.ref_ids_at(from);
        let mut pairs = Vec::new();
        for target in self.table_refs_at(to) {
            if origin.contains(&target.ref_id) {
                continue;
            }
            for ancestor in self.ancestors(&target.ref_id) {
                if origin.contains(&ancestor) {
                    pairs.push((ancestor, target.ref_id.clone()));
                }
            }
        }
        pairs.sort();
        pairs
    }

    fn ancestors(&self, ref_id: &str) -> BTreeSet<String> {
        let mut ancestors = BTreeSet::new();
        let mut queue = VecDeque::from([ref_id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if let Some(table) = self.tables.get(&current) {
                for parent in &table.based_on {
                    if ancestors.insert(parent.clone()) {
                        queue.push_back(parent.clone());
                    }
                }
            }
        }
        ancestors
    }

    // ----- columns -----

    /// Register a column on a table ref.
    pub fn add_column(&mut self, ref_id: &str, name: &str) -> Result<(), Error> {
        let table = self.table_ref_mut(ref_id)?;
        if table.columns.contains_key(name) {
            return Err(Error::DuplicateColumn {
                table: ref_id.to_string(),
                column: name.to_string(),
            });
        }
        table.columns.insert(name.to_string(), ColumnRef::new(name));
        Ok(())
    }

    /// Rename a column, keeping its lineage.
    pub fn rename_column(&mut self, ref_id: &str, name: &str, new_name: &str) -> Result<(), Error> {
        let table = self.table_ref_mut(ref_id)?;
        if table.columns.contains_key(new_name) {
            return Err(Error::DuplicateColumn {
                table: ref_id.to_string(),
                column: new_name.to_string(),
            });
        }
        let mut column = table.columns.remove(name).ok_or_else(|| Error::UnknownColumn {
            table: ref_id.to_string(),
            column: name.to_string(),
        })?;
        column.name = new_name.to_string();
        let links: Vec<ColumnKey> = column
            .based_on
            .iter()
            .chain(column.basis_for.iter())
            .cloned()
            .collect();
        table.columns.insert(new_name.to_string(), column);

        let old_key = ColumnKey::new(ref_id, name);
        let new_key = ColumnKey::new(ref_id, new_name);
        for link in links {
            if let Some(other) = self
                .tables
                .get_mut(&link.table)
                .and_then(|t| t.columns.get_mut(&link.column))
            {
                if other.based_on.remove(&old_key) {
                    other.based_on.insert(new_key.clone());
                }
                if other.basis_for.remove(&old_key) {
                    other.basis_for.insert(new_key.clone());
                }
            }
        }
        Ok(())
    }

    /// Remove a column and its lineage.
    pub fn drop_column(&mut self, ref_id: &str, name: &str) -> Result<(), Error> {
        let column = self
            .table_ref_mut(ref_id)?
            .columns
            .remove(name)
            .ok_or_else(|| Error::UnknownColumn {
                table: ref_id.to_string(),
                column: name.to_string(),
            })?;
        let key = ColumnKey::new(ref_id, name);
        for link in column.based_on.iter().chain(column.basis_for.iter()) {
            if let Some(other) = self
                .tables
                .get_mut(&link.table)
                .and_then(|t| t.columns.get_mut(&link.column))
            {
                other.based_on.remove(&key);
                other.basis_for.remove(&key);
            }
        }
        Ok(())
    }

    fn link_columns(&mut self, from: &ColumnKey, to: &ColumnKey) -> Result<(), Error> {
        let unknown = |key: &ColumnKey| Error::UnknownColumn {
            table: key.table.clone(),
            column: key.column.clone(),
        };
        self.table_ref_mut(&from.table)?
            .columns
            .get_mut(&from.column)
            .ok_or_else(|| unknown(from))?
            .basis_for
            .insert(to.clone());
        self.table_ref_mut(&to.table)?
            .columns
            .get_mut(&to.column)
            .ok_or_else(|| unknown(to))?
            .based_on
            .insert(from.clone());
        Ok(())
    }

    /// For every column of `source`, the column of `target` it corresponds
    /// to by lineage. Lineage is followed forwards first, then backwards.
    /// Columns without a counterpart are left out.
    pub fn column_mapping(&self, source: &str, target: &str) -> Result<ColumnMapping, Error> {
        let source_ref = self.table_ref_by_id(source)?;
        self.table_ref_by_id(target)?;

        let mut mapping = ColumnMapping::new();
        for name in source_ref.columns.keys() {
            let start = ColumnKey::new(source, name.clone());
            let found = self
                .follow(&start, target, |c| &c.basis_for)
                .or_else(|| self.follow(&start, target, |c| &c.based_on));
            if let Some(column) = found {
                mapping.insert(name.clone(), column);
            }
        }
        Ok(mapping)
    }

    fn follow<F>(&self, start: &ColumnKey, target: &str, links: F) -> Option<String>
    where
        F: Fn(&ColumnRef) -> &BTreeSet<ColumnKey>,
    {
        let mut seen = BTreeSet::from([start.clone()]);
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(key) = queue.pop_front() {
            if key.table == target {
                return Some(key.column);
            }
            let column = self
                .tables
                .get(&key.table)
                .and_then(|t| t.columns.get(&key.column));
            if let Some(column) = column {
                for next in links(column) {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        None
    }

    // ----- views -----

    /// Register a view ref visible at a single version.
    pub fn add_view(&mut self, name: &str, ref_id: &str, version: &VersionId) -> Result<&ViewRef, Error> {
        self.check_ref_id_free(ref_id)?;
        self.check_name_free(name, version)?;
        self.views.insert(
            ref_id.to_string(),
            ViewRef {
                name: name.to_string(),
                ref_id: ref_id.to_string(),
                versions: BTreeSet::from([version.clone()]),
            },
        );
        self.view_ref_by_id(ref_id)
    }

    /// The view ref backing a logical name at a version.
    pub fn view_ref(&self, version: &VersionId, name: &str) -> Result<&ViewRef, Error> {
        self.views
            .values()
            .find(|v| v.name == name && v.versions.contains(version))
            .ok_or_else(|| Error::UnknownViewRef {
                version: version.to_string(),
                name: name.to_string(),
            })
    }

    /// Look up a view ref by ref-id.
    pub fn view_ref_by_id(&self, ref_id: &str) -> Result<&ViewRef, Error> {
        self.views
            .get(ref_id)
            .ok_or_else(|| Error::UnknownRefId(ref_id.to_string()))
    }

    /// View refs visible at a version.
    pub fn view_refs_at<'a>(&'a self, version: &'a VersionId) -> impl Iterator<Item = &'a ViewRef> + 'a {
        self.views.values().filter(move |v| v.versions.contains(version))
    }

    /// All view refs.
    pub fn view_refs(&self) -> impl Iterator<Item = &ViewRef> {
        self.views.values()
    }

    /// Hide a view ref at a version.
    pub fn remove_view_version(&mut self, ref_id: &str, version: &VersionId) -> Result<(), Error> {
        self.views
            .get_mut(ref_id)
            .ok_or_else(|| Error::UnknownRefId(ref_id.to_string()))?
            .versions
            .remove(version);
        Ok(())
    }

    /// Remove a view ref.
    pub fn drop_view(&mut self, ref_id: &str) -> Result<ViewRef, Error> {
        self.views
            .remove(ref_id)
            .ok_or_else(|| Error::UnknownRefId(ref_id.to_string()))
    }

    // ----- synchronizers -----

    /// Record an installed synchronizer, replacing any with the same trigger.
    pub fn add_sync(&mut self, sync: SyncRef) {
        self.syncs.insert(sync.trigger_name.clone(), sync);
    }

    /// Look up a synchronizer by trigger name.
    pub fn sync(&self, trigger_name: &str) -> Option<&SyncRef> {
        self.syncs.get(trigger_name)
    }

    /// The synchronizer from `source` to `target`, if installed.
    pub fn sync_between(&self, source: &str, target: &str) -> Option<&SyncRef> {
        self.syncs
            .values()
            .find(|s| s.source == source && s.target == target)
    }

    /// The synchronizer from `source` to `target`, mutably.
    pub fn sync_between_mut(&mut self, source: &str, target: &str) -> Option<&mut SyncRef> {
        self.syncs
            .values_mut()
            .find(|s| s.source == source && s.target == target)
    }

    /// Synchronizers writing into `ref_id`.
    pub fn inbound_syncs(&self, ref_id: &str) -> Vec<&SyncRef> {
        self.syncs.values().filter(|s| s.target == ref_id).collect()
    }

    /// Synchronizers triggered by writes to `ref_id`.
    pub fn outbound_syncs(&self, ref_id: &str) -> Vec<&SyncRef> {
        self.syncs.values().filter(|s| s.source == ref_id).collect()
    }

    /// All synchronizers.
    pub fn syncs(&self) -> impl Iterator<Item = &SyncRef> {
        self.syncs.values()
    }

    /// Forget a synchronizer.
    pub fn drop_sync(&mut self, trigger_name: &str) -> Option<SyncRef> {
        self.syncs.remove(trigger_name)
    }

    // ----- versions -----

    /// Mark a version active or inactive.
    pub fn set_version_state(&mut self, version: &VersionId, active: bool) {
        if active {
            self.active_versions.insert(version.clone());
        } else {
            self.active_versions.remove(version);
        }
    }

    /// Check if a version is active.
    pub fn is_active(&self, version: &VersionId) -> bool {
        self.active_versions.contains(version)
    }

    /// All active versions.
    pub fn active_versions(&self) -> &BTreeSet<VersionId> {
        &self.active_versions
    }

    // ----- ids -----

    /// Generate an unused table ref-id.
    pub fn generate_table_ref_id(&self) -> String {
        ids::generate(TABLE_PREFIX, |id| self.is_ref_id_taken(id))
    }

    /// Generate an unused view ref-id.
    pub fn generate_view_ref_id(&self) -> String {
        ids::generate(VIEW_PREFIX, |id| self.is_ref_id_taken(id))
    }

    fn is_ref_id_taken(&self, ref_id: &str) -> bool {
        self.tables.contains_key(ref_id) || self.views.contains_key(ref_id)
    }

    fn check_ref_id_free(&self, ref_id: &str) -> Result<(), Error> {
        if self.is_ref_id_taken(ref_id) {
            return Err(Error::Duplicate(ref_id.to_string()));
        }
        Ok(())
    }

    fn check_name_free(&self, name: &str, version: &VersionId) -> Result<(), Error> {
        let taken = self
            .tables
            .values()
            .any(|t| t.name == name && t.is_at(version))
            || self
                .views
                .values()
                .any(|v| v.name == name && v.versions.contains(version));
        if taken {
            return Err(Error::NameTaken {
                version: version.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::{Changelog, Operation};

    fn setup() -> (RefLog, Changelog, VersionId, VersionId) {
        let mut changelog = Changelog::new();
        let root = changelog.root().id.clone();
        let next = changelog
            .add_change_set("alice", None, vec![Operation::data("SELECT 1")])
            .unwrap()
            .remove(0);
        let mut ref_log = RefLog::new();
        ref_log
            .add_table("users", "users", &root, ["id", "name"])
            .unwrap();
        ref_log.set_version_state(&root, true);
        (ref_log, changelog, root, next)
    }

    #[test]
    fn test_fork_and_ghost() {
        let (mut ref_log, changelog, root, next) = setup();
        ref_log.fork(changelog.version(&next).unwrap()).unwrap();
        assert_eq!(ref_log.table_ref(&next, "users").unwrap().ref_id, "users");

        ref_log.ghost_table("users", "table_1", &next).unwrap();
        assert_eq!(ref_log.table_ref(&root, "users").unwrap().ref_id, "users");
        assert_eq!(ref_log.table_ref(&next, "users").unwrap().ref_id, "table_1");
        assert_eq!(
            ref_log.table_mapping(&root, &next),
            vec![("users".to_string(), "table_1".to_string())]
        );
        assert!(ref_log.table_mapping(&root, &root).is_empty());
    }

    #[test]
    fn test_fork_root_fails() {
        let (mut ref_log, changelog, _, _) = setup();
        assert!(ref_log.fork(changelog.root()).is_err());
    }

    #[test]
    fn test_name_unique_per_version() {
        let (mut ref_log, _, root, next) = setup();
        assert!(matches!(
            ref_log.add_table("users", "other", &root, ["id"]),
            Err(Error::NameTaken { .. })
        ));
        assert!(ref_log.add_table("users", "other", &next, ["id"]).is_ok());
        assert!(matches!(
            ref_log.add_view("users", "view_x", &root),
            Err(Error::NameTaken { .. })
        ));
    }

    #[test]
    fn test_column_mapping_follows_renames() {
        let (mut ref_log, changelog, _, next) = setup();
        ref_log.fork(changelog.version(&next).unwrap()).unwrap();
        ref_log.ghost_table("users", "table_1", &next).unwrap();
        ref_log.rename_column("table_1", "name", "full_name").unwrap();
        ref_log.add_column("table_1", "email").unwrap();

        let forwards = ref_log.column_mapping("users", "table_1").unwrap();
        assert_eq!(forwards.get("id").map(String::as_str), Some("id"));
        assert_eq!(forwards.get("name").map(String::as_str), Some("full_name"));
        assert_eq!(forwards.len(), 2);

        let backwards = ref_log.column_mapping("table_1", "users").unwrap();
        assert_eq!(backwards.get("full_name").map(String::as_str), Some("name"));
        assert!(!backwards.contains_key("email"));
    }

    #[test]
    fn test_drop_column_breaks_lineage() {
        let (mut ref_log, changelog, _, next) = setup();
        ref_log.fork(changelog.version(&next).unwrap()).unwrap();
        ref_log.ghost_table("users", "table_1", &next).unwrap();
        ref_log.drop_column("table_1", "name").unwrap();
        let mapping = ref_log.column_mapping("users", "table_1").unwrap();
        assert_eq!(mapping.len(), 1);
        assert!(ref_log.table_ref_by_id("users").unwrap().columns["name"].basis_for.is_empty());
    }

    #[test]
    fn test_descendant_at() {
        let (mut ref_log, changelog, root, next) = setup();
        ref_log.fork(changelog.version(&next).unwrap()).unwrap();
        ref_log.ghost_table("users", "table_1", &next).unwrap();
        assert_eq!(ref_log.descendant_at("users", &next).unwrap().ref_id, "table_1");
        assert_eq!(ref_log.descendant_at("users", &root).unwrap().ref_id, "users");
        assert!(ref_log.descendant_at("table_1", &root).is_none());
    }

    #[test]
    fn test_drop_table_removes_syncs_and_lineage() {
        let (mut ref_log, changelog, _, next) = setup();
        ref_log.fork(changelog.version(&next).unwrap()).unwrap();
        ref_log.ghost_table("users", "table_1", &next).unwrap();
        ref_log.add_sync(SyncRef {
            trigger_name: "trig".into(),
            function_name: "func".into(),
            source: "users".into(),
            target: "table_1".into(),
            direction: SyncDirection::Forwards,
            column_mapping: ColumnMapping::new(),
        });
        assert_eq!(ref_log.outbound_syncs("users").len(), 1);
        assert_eq!(ref_log.inbound_syncs("table_1").len(), 1);

        ref_log.drop_table("users").unwrap();
        assert_eq!(ref_log.syncs().count(), 0);
        let ghost = ref_log.table_ref_by_id("table_1").unwrap();
        assert!(ghost.based_on.is_empty());
        assert!(ghost.columns["id"].based_on.is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let (ref_log, _, _, _) = setup();
        let id = ref_log.generate_table_ref_id();
        assert!(id.starts_with(TABLE_PREFIX));
        assert!(ref_log.generate_view_ref_id().starts_with(VIEW_PREFIX));
        assert!(!ref_log.contains_table_ref(&id));
    }

    #[test]
    fn test_sync_mapping_growth() {
        let mut sync = SyncRef {
            trigger_name: "t".into(),
            function_name: "f".into(),
            source: "a".into(),
            target: "b".into(),
            direction: SyncDirection::Forwards,
            column_mapping: ColumnMapping::from([("id".to_string(), "id".to_string())]),
        };
        sync.add_mapping(&ColumnMapping::from([
            ("id".to_string(), "other".to_string()),
            ("name".to_string(), "name".to_string()),
        ]));
        assert_eq!(sync.column_mapping["id"], "id");
        assert_eq!(sync.column_mapping["name"], "name");
    }
}
