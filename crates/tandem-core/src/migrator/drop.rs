//! Retiring versions at either end of the active range.

use super::error::MigrationError;
use crate::changelog::{OperationKind, VersionId};
use crate::error::Error;
use crate::reflog::{ColumnMapping, SyncRef};
use crate::schema::quote_ident;
use crate::state::State;
use crate::sync::{self, SyncFunction};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Everything removed when a version is dropped, computed before any
/// statement runs.
#[derive(Debug, Clone)]
pub struct DropPlan {
    /// Versions retired together, newest first.
    pub versions: Vec<VersionId>,
    /// Ref-ids of the physical tables to drop.
    pub tables: Vec<String>,
    /// Ref-ids of the views to drop.
    pub views: Vec<String>,
    /// Synchronizers of the dropped tables.
    pub retired_syncs: Vec<SyncRef>,
    /// Synchronizers connecting the surviving neighbours directly.
    pub composed_syncs: Vec<SyncFunction>,
    /// `(sequence, table, column)`: sequences handed over to a surviving
    /// column before their owner is dropped.
    pub sequence_owners: Vec<(String, String, String)>,
}

impl DropPlan {
    /// Check that `version` can be dropped and work out what goes with it.
    pub fn new(state: &State, version: &VersionId) -> Result<Self, MigrationError> {
        let target = state.changelog.version(version)?;
        if !target.is_root() && target.operation.as_ref().map(|o| o.kind()) != Some(OperationKind::Ddl) {
            return Err(MigrationError::NonSchemaOperation {
                version: version.to_string(),
            });
        }
        if !state.ref_log.is_active(version) {
            return Err(MigrationError::VersionNotActive {
                version: version.to_string(),
            });
        }
        let active = state.ref_log.active_versions();
        if active.len() == 1 {
            return Err(MigrationError::SoleActiveVersion {
                version: version.to_string(),
            });
        }
        let ordered: Vec<VersionId> = state
            .changelog
            .chain()
            .into_iter()
            .filter(|v| active.contains(v))
            .collect();
        if ordered.first() != Some(version) && ordered.last() != Some(version) {
            return Err(MigrationError::NotAtBoundary {
                version: version.to_string(),
            });
        }

        let versions = state.changelog.change_set_run(version)?;
        let dropped: BTreeSet<VersionId> = versions.iter().cloned().collect();
        let surviving: BTreeSet<VersionId> = active.difference(&dropped).cloned().collect();

        let tables: Vec<String> = state
            .ref_log
            .table_refs()
            .filter(|t| !t.versions.is_disjoint(&dropped) && t.versions.is_disjoint(&surviving))
            .filter(|t| state.catalog.contains_table(&t.ref_id))
            .map(|t| t.ref_id.clone())
            .collect();
        let views: Vec<String> = state
            .ref_log
            .view_refs()
            .filter(|v| !v.versions.is_disjoint(&dropped) && v.versions.is_disjoint(&surviving))
            .map(|v| v.ref_id.clone())
            .collect();
        let gone: BTreeSet<&str> = tables.iter().map(String::as_str).collect();

        let mut retired_syncs: Vec<SyncRef> = Vec::new();
        let mut composed_syncs: Vec<SyncFunction> = Vec::new();
        for table in &tables {
            let inbound = state.ref_log.inbound_syncs(table);
            let outbound = state.ref_log.outbound_syncs(table);
            for sync in inbound.iter().chain(outbound.iter()) {
                if !retired_syncs.iter().any(|s| s.trigger_name == sync.trigger_name) {
                    retired_syncs.push((*sync).clone());
                }
            }

            for incoming in &inbound {
                for outgoing in &outbound {
                    let (source, target) = (&incoming.source, &outgoing.target);
                    if source == target
                        || incoming.direction != outgoing.direction
                        || gone.contains(source.as_str())
                        || gone.contains(target.as_str())
                        || state.ref_log.sync_between(source, target).is_some()
                    {
                        continue;
                    }
                    let mapping = compose_mappings(&incoming.column_mapping, &outgoing.column_mapping);
                    if mapping.is_empty() {
                        continue;
                    }
                    let composed = SyncFunction::from_catalog(
                        &state.catalog,
                        source,
                        target,
                        incoming.direction,
                        mapping,
                    )?
                    .with_all_columns();
                    if let Err(err) = composed.install_statements() {
                        warn!(source = %source, target = %target, error = %err, "cannot compose synchronizer");
                        continue;
                    }
                    debug!(source = %source, via = %table, target = %target, "composed synchronizer");
                    composed_syncs.push(composed);
                }
            }
        }

        let mut sequence_owners = Vec::new();
        let sequences: BTreeSet<String> = tables
            .iter()
            .filter_map(|t| state.catalog.table(t).ok())
            .flat_map(|t| t.columns.iter().filter_map(|c| c.sequence.clone()))
            .collect();
        for sequence in sequences {
            let survivor = state
                .catalog
                .tables_using_sequence(&sequence)
                .into_iter()
                .find(|(table, _)| !gone.contains(table.as_str()));
            if let Some((table, column)) = survivor {
                sequence_owners.push((sequence, table, column));
            }
        }

        Ok(Self {
            versions,
            tables,
            views,
            retired_syncs,
            composed_syncs,
            sequence_owners,
        })
    }

    /// Statements in execution order: composed synchronizers, retired
    /// synchronizers, sequence hand-over, views, tables.
    pub fn statements(&self) -> Result<Vec<String>, Error> {
        let mut statements = Vec::new();
        for composed in &self.composed_syncs {
            statements.extend(composed.install_statements()?);
        }
        for retired in &self.retired_syncs {
            statements.extend(sync::drop_statements(retired));
        }
        for (sequence, table, column) in &self.sequence_owners {
            statements.push(format!(
                "ALTER SEQUENCE {} OWNED BY {}.{}",
                quote_ident(sequence),
                quote_ident(table),
                quote_ident(column)
            ));
        }
        for view in &self.views {
            statements.push(format!("DROP VIEW IF EXISTS {} CASCADE", quote_ident(view)));
        }
        for table in &self.tables {
            statements.push(format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table)));
        }
        Ok(statements)
    }

    /// Reflect the drop in the state once the statements committed.
    pub fn apply(&self, state: &mut State) -> Result<(), Error> {
        for composed in &self.composed_syncs {
            state.ref_log.add_sync(composed.to_sync_ref());
        }
        for retired in &self.retired_syncs {
            state.ref_log.drop_sync(&retired.trigger_name);
        }
        for view in &self.views {
            state.ref_log.drop_view(view)?;
            if state.catalog.view(view).is_ok() {
                state.catalog.remove_view(view)?;
            }
        }
        for table in &self.tables {
            state.ref_log.drop_table(table)?;
            let removed = state.catalog.remove_table(table)?;
            for sequence in removed.columns.iter().filter_map(|c| c.sequence.as_deref()) {
                if state.catalog.tables_using_sequence(sequence).is_empty() {
                    state.catalog.remove_sequence(sequence)?;
                }
            }
        }

        let table_ids: Vec<String> = state.ref_log.table_refs().map(|t| t.ref_id.clone()).collect();
        let view_ids: Vec<String> = state.ref_log.view_refs().map(|v| v.ref_id.clone()).collect();
        for version in &self.versions {
            for ref_id in &table_ids {
                state.ref_log.remove_version(ref_id, version)?;
            }
            for ref_id in &view_ids {
                state.ref_log.remove_view_version(ref_id, version)?;
            }
            state.ref_log.set_version_state(version, false);
        }
        Ok(())
    }
}

/// Compose two synchronizer mappings. A column `a` mapped to `b` by
/// `inbound` maps to whatever `outbound` maps `b` to; columns missing from
/// either side are left out.
pub fn compose_mappings(inbound: &ColumnMapping, outbound: &ColumnMapping) -> ColumnMapping {
    inbound
        .iter()
        .filter_map(|(a, b)| outbound.get(b).map(|c| (a.clone(), c.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> ColumnMapping {
        pairs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn test_compose_mappings() {
        let composed = compose_mappings(
            &mapping(&[("a", "b"), ("x", "y"), ("only_in", "missing")]),
            &mapping(&[("b", "c"), ("y", "z"), ("unused", "w")]),
        );
        assert_eq!(composed, mapping(&[("a", "c"), ("x", "z")]));
    }

    #[test]
    fn test_compose_with_empty_side() {
        assert!(compose_mappings(&mapping(&[("a", "b")]), &ColumnMapping::new()).is_empty());
        assert!(compose_mappings(&ColumnMapping::new(), &mapping(&[("b", "c")])).is_empty());
    }
}
