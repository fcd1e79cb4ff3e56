//! End-to-end migrator behaviour against the in-memory backend.

use std::collections::BTreeMap;
use tandem_core::backend::BackendError;
use tandem_core::{
    Catalog, Column, ColumnType, DropPlan, ExecutionStage, ForeignKey, MemoryBackend, MigrationError,
    Migrator, MigratorConfig, Operation, SchemaOperation, StageOutcome, State, StateStore, SyncDirection,
    SyncRef, Table, VersionId,
};

fn shop() -> State {
    let users = Table::new("users")
        .with_column(Column::new("id", ColumnType::Integer).primary_key())
        .with_column(Column::new("name", ColumnType::Text).not_null());
    let mut orders = Table::new("orders")
        .with_column(Column::new("id", ColumnType::Integer).primary_key())
        .with_column(Column::new("user_id", ColumnType::Integer).not_null());
    orders
        .add_foreign_key(ForeignKey::new(
            "orders_user",
            "orders",
            vec!["user_id".into()],
            "users",
            vec!["id".into()],
        ))
        .unwrap();
    let catalog = Catalog::new("shop")
        .with_table(users)
        .unwrap()
        .with_table(orders)
        .unwrap();
    State::bootstrap(catalog).unwrap()
}

fn append(state: &mut State, operations: Vec<Operation>) -> Vec<VersionId> {
    state.changelog.add_change_set("test", None, operations).unwrap()
}

fn add_email(state: &mut State) -> VersionId {
    let ids = append(
        state,
        vec![SchemaOperation::add_column("users", Column::new("email", ColumnType::Text)).into()],
    );
    ids[0].clone()
}

fn migrator(backend: MemoryBackend) -> (Migrator<MemoryBackend>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = StateStore::open(&db).unwrap();
    (Migrator::new(backend, store), dir)
}

#[test]
fn test_schema_migration_runs_every_stage() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());

    let report = migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.ghost_tables.len(), 2);
    assert_eq!(report.steps_executed, 2);

    // ghost tables, steps, indexes, back sync, views
    assert_eq!(backend.committed().len(), 5);
    assert!(backend.rolled_back().is_empty());

    assert!(state.ref_log.is_active(&root));
    assert!(state.ref_log.is_active(&v1));
    let users = state.ref_log.table_ref(&v1, "users").unwrap().ref_id.clone();
    assert_ne!(users, "users");
    assert_eq!(state.ref_log.table_ref(&root, "users").unwrap().ref_id, "users");

    let forward = state.ref_log.sync_between("users", &users).unwrap();
    assert_eq!(forward.direction, SyncDirection::Forwards);
    assert_eq!(forward.column_mapping.len(), 2);
    let backward = state.ref_log.sync_between(&users, "users").unwrap();
    assert_eq!(backward.direction, SyncDirection::Backwards);
    assert!(!backward.column_mapping.contains_key("email"));

    assert_eq!(migrator.store().load().unwrap(), Some(state));
}

#[test]
fn test_parent_table_is_copied_before_child() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());

    migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    let users = state.ref_log.table_ref(&v1, "users").unwrap().ref_id.clone();
    let orders = state.ref_log.table_ref(&v1, "orders").unwrap().ref_id.clone();

    let copies: Vec<String> = backend.committed()[1]
        .iter()
        .filter(|s| s.starts_with("INSERT INTO"))
        .cloned()
        .collect();
    assert_eq!(copies.len(), 2);
    assert!(copies[0].starts_with(&format!("INSERT INTO \"{users}\"")));
    assert!(copies[1].starts_with(&format!("INSERT INTO \"{orders}\"")));
}

#[test]
fn test_failed_stage_rolls_back_and_keeps_state() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let before = state.clone();
    let backend = MemoryBackend::new().fail_when_contains("CREATE TRIGGER");
    let (migrator, _dir) = migrator(backend.clone());

    let err = migrator.apply_schema_changes(&mut state, &root, &v1).unwrap_err();
    match err {
        MigrationError::StageFailed { stage, source } => {
            assert_eq!(stage, ExecutionStage::StepsExecuting);
            assert!(matches!(source, BackendError::Statement { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.committed().len(), 1);
    assert_eq!(backend.rolled_back().len(), 1);
    assert_eq!(state, before);
    assert!(migrator.store().load().unwrap().is_none());

    backend.clear_failures();
    let report = migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    assert!(report.is_complete());
}

#[test]
fn test_dry_run_executes_nothing() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let before = state.clone();
    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());
    let migrator = migrator.with_config(MigratorConfig::default().with_dry_run(true));

    let report = migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.stage, ExecutionStage::Created);
    assert_eq!(report.plan.steps().len(), 2);
    assert!(backend.statements().is_empty());
    assert_eq!(state, before);
}

#[test]
fn test_inactive_origin_is_rejected() {
    let mut state = shop();
    let v1 = add_email(&mut state);
    let v2 = append(
        &mut state,
        vec![SchemaOperation::add_column("orders", Column::new("note", ColumnType::Text)).into()],
    )[0]
    .clone();
    let (migrator, _dir) = migrator(MemoryBackend::new());
    assert!(matches!(
        migrator.apply_schema_changes(&mut state, &v1, &v2),
        Err(MigrationError::VersionNotActive { .. })
    ));
}

#[test]
fn test_data_stage_runs_against_ghost_tables() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());
    migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    let users = state.ref_log.table_ref(&v1, "users").unwrap().ref_id.clone();

    let stage = append(
        &mut state,
        vec![
            Operation::data("INSERT INTO users (id, name, email) VALUES (1, 'users', 'a@b.c')"),
            Operation::data("DELETE FROM users WHERE id = 2"),
        ],
    );
    migrator.apply_data_changes(&mut state, &stage).unwrap();

    assert_eq!(
        backend.committed().last().unwrap(),
        &vec![
            format!("INSERT INTO {users} (id, name, email) VALUES (1, 'users', 'a@b.c')"),
            format!("DELETE FROM {users} WHERE id = 2"),
        ]
    );
    let last = stage.last().unwrap();
    assert!(state.ref_log.is_active(last));
    assert!(!state.ref_log.is_active(&v1));
    assert_eq!(state.ref_log.table_ref(last, "users").unwrap().ref_id, users);
}

#[test]
fn test_data_stage_failure_rolls_back_everything() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let stage = append(
        &mut state,
        vec![
            Operation::data("INSERT INTO users (id, name) VALUES (1, 'a')"),
            Operation::data("INSERT INTO orders (id, user_id) VALUES (1, 1)"),
        ],
    );
    let before = state.clone();
    let backend = MemoryBackend::new().fail_when_contains("orders");
    let (migrator, _dir) = migrator(backend.clone());

    let err = migrator.apply_data_changes(&mut state, &stage).unwrap_err();
    assert!(matches!(err, MigrationError::DataStageFailed { .. }));
    assert_eq!(backend.rolled_back(), vec![vec!["INSERT INTO users (id, name) VALUES (1, 'a')".to_string()]]);
    assert!(backend.committed().is_empty());
    assert_eq!(state, before);
    assert!(state.ref_log.is_active(&root));
}

#[test]
fn test_data_stage_with_schema_operation_is_rejected_before_io() {
    let mut state = shop();
    let ids = append(
        &mut state,
        vec![
            Operation::data("DELETE FROM orders"),
            SchemaOperation::drop_table("orders").into(),
        ],
    );
    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());

    assert!(matches!(
        migrator.apply_data_changes(&mut state, &ids),
        Err(MigrationError::NonDataOperationInStage { .. })
    ));
    assert!(matches!(
        migrator.apply_data_changes(&mut state, &[]),
        Err(MigrationError::EmptyStage)
    ));
    assert!(backend.statements().is_empty());
}

#[test]
fn test_migrate_splits_schema_and_data_stages() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    add_email(&mut state);
    let data = append(&mut state, vec![Operation::data("UPDATE users SET email = 'x'")]);
    let target = append(
        &mut state,
        vec![SchemaOperation::add_column("orders", Column::new("note", ColumnType::Text)).into()],
    )[0]
    .clone();
    let (migrator, _dir) = migrator(MemoryBackend::new());

    let outcomes = migrator.migrate(&mut state, &root, &target).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], StageOutcome::Schema(_)));
    assert!(matches!(outcomes[1], StageOutcome::Data { statements: 1, .. }));
    assert!(matches!(outcomes[2], StageOutcome::Schema(_)));
    assert_eq!(outcomes[1].to(), &data[0]);
    assert!(state.ref_log.is_active(&target));
}

#[test]
fn test_dry_run_migrate_checks_later_stages() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    add_email(&mut state);
    append(&mut state, vec![Operation::data("UPDATE users SET email = 'x'")]);
    let target = append(
        &mut state,
        vec![SchemaOperation::add_column("orders", Column::new("note", ColumnType::Text)).into()],
    )[0]
    .clone();
    let before = state.clone();
    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());
    let migrator = migrator.with_config(MigratorConfig::default().with_dry_run(true));

    let outcomes = migrator.migrate(&mut state, &root, &target).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(backend.statements().is_empty());
    assert_eq!(state, before);
}

#[test]
fn test_drop_oldest_version() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());
    migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    backend.reset();

    let plan = migrator.drop(&mut state, &root).unwrap();
    assert_eq!(plan.tables, vec!["orders".to_string(), "users".to_string()]);
    assert!(plan.composed_syncs.is_empty());

    let statements = backend.committed().concat();
    let first_table_drop = statements
        .iter()
        .position(|s| s.starts_with("DROP TABLE"))
        .unwrap();
    assert!(statements[..first_table_drop]
        .iter()
        .all(|s| s.starts_with("DROP TRIGGER") || s.starts_with("DROP FUNCTION")));
    assert_eq!(statements.len() - first_table_drop, 2);

    assert!(!state.ref_log.is_active(&root));
    assert!(state.ref_log.is_active(&v1));
    assert!(!state.catalog.contains_table("users"));
    assert_eq!(state.ref_log.syncs().count(), 0);
    assert!(state.ref_log.table_ref(&v1, "users").is_ok());

    assert!(matches!(
        migrator.drop(&mut state, &v1),
        Err(MigrationError::SoleActiveVersion { .. })
    ));
}

#[test]
fn test_drop_rejects_middle_and_data_versions() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let (migrator, _dir) = migrator(MemoryBackend::new());
    migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    let v2 = append(
        &mut state,
        vec![SchemaOperation::add_column("orders", Column::new("note", ColumnType::Text)).into()],
    )[0]
    .clone();
    migrator.apply_schema_changes(&mut state, &v1, &v2).unwrap();

    assert!(matches!(
        migrator.drop(&mut state, &v1),
        Err(MigrationError::NotAtBoundary { .. })
    ));

    let data = append(&mut state, vec![Operation::data("DELETE FROM orders")]);
    assert!(matches!(
        migrator.drop(&mut state, &data[0]),
        Err(MigrationError::NonSchemaOperation { .. })
    ));
}

#[test]
fn test_drop_connects_surviving_neighbours() {
    let table = |name: &str, column: &str| {
        Table::new(name)
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new(column, ColumnType::Text))
    };
    let catalog = Catalog::new("db")
        .with_table(table("a", "x"))
        .unwrap()
        .with_table(table("b", "y"))
        .unwrap()
        .with_table(table("c", "z"))
        .unwrap();
    let mut state = State::bootstrap(Catalog::new("db")).unwrap();
    state.catalog = catalog;
    let root = state.changelog.root().id.clone();
    let v1 = append(&mut state, vec![SchemaOperation::drop_table("t").into()])[0].clone();
    let v2 = append(&mut state, vec![SchemaOperation::drop_table("t").into()])[0].clone();

    state.ref_log.add_table("t", "a", &root, ["id", "x"]).unwrap();
    state.ref_log.add_table("t", "b", &v1, ["id", "y"]).unwrap();
    state.ref_log.add_table("t", "c", &v2, ["id", "z"]).unwrap();
    let sync = |source: &str, target: &str, mapping: &[(&str, &str)]| SyncRef {
        trigger_name: tandem_core::sync::trigger_name(source, target),
        function_name: tandem_core::sync::function_name(source, target),
        source: source.to_string(),
        target: target.to_string(),
        direction: SyncDirection::Forwards,
        column_mapping: mapping
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect(),
    };
    state.ref_log.add_sync(sync("a", "b", &[("id", "id"), ("x", "y")]));
    state.ref_log.add_sync(sync("b", "c", &[("id", "id"), ("y", "z")]));
    state.ref_log.set_version_state(&root, false);
    state.ref_log.set_version_state(&v1, true);
    state.ref_log.set_version_state(&v2, true);

    let plan = DropPlan::new(&state, &v1).unwrap();
    assert_eq!(plan.tables, vec!["b".to_string()]);
    assert_eq!(plan.composed_syncs.len(), 1);
    assert_eq!(
        plan.composed_syncs[0].to_sync_ref().column_mapping,
        BTreeMap::from([("id".to_string(), "id".to_string()), ("x".to_string(), "z".to_string())])
    );

    let backend = MemoryBackend::new();
    let (migrator, _dir) = migrator(backend.clone());
    migrator.drop(&mut state, &v1).unwrap();
    let statements = backend.committed().concat();
    assert!(statements[0].starts_with("CREATE OR REPLACE FUNCTION"));
    assert_eq!(statements.last().unwrap(), "DROP TABLE IF EXISTS \"b\" CASCADE");

    assert!(state.ref_log.sync_between("a", "c").is_some());
    assert!(state.ref_log.sync_between("a", "b").is_none());
    assert!(!state.catalog.contains_table("b"));
    assert!(state.catalog.contains_table("a"));
    assert!(!state.ref_log.is_active(&v1));
}

#[test]
fn test_script_backend_writes_every_stage() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let v1 = add_email(&mut state);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("migration.sql");
    let db = sled::open(dir.path().join("state")).unwrap();
    let migrator = Migrator::new(
        tandem_core::DryRunBackend::create(&path).unwrap(),
        StateStore::open(&db).unwrap(),
    );

    migrator.apply_schema_changes(&mut state, &root, &v1).unwrap();
    migrator.backend().flush().unwrap();
    let script = std::fs::read_to_string(&path).unwrap();
    assert_eq!(script.matches("BEGIN;\n").count(), 5);
    assert_eq!(script.matches("COMMIT;\n").count(), 5);
    assert_eq!(script.matches("CREATE TABLE IF NOT EXISTS").count(), 2);
    assert_eq!(script.matches("CREATE TRIGGER").count(), 4);
}

fn add_email_with_view(state: &mut State) -> VersionId {
    let ids = append(
        state,
        vec![
            SchemaOperation::add_column("users", Column::new("email", ColumnType::Text)).into(),
            SchemaOperation::create_view("user_emails", "SELECT id, email FROM users").into(),
        ],
    );
    ids[1].clone()
}

fn committed_statements(backend: &MemoryBackend) -> Vec<String> {
    backend.committed().into_iter().flatten().collect()
}

fn created_triggers(statements: &[String]) -> std::collections::BTreeSet<String> {
    statements
        .iter()
        .filter(|s| s.starts_with("CREATE TRIGGER"))
        .filter_map(|s| s.split_whitespace().nth(2))
        .map(|name| name.trim_matches('"').to_string())
        .collect()
}

#[test]
fn test_retry_continues_with_the_same_ghosts() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let to = add_email_with_view(&mut state);
    let before = state.clone();
    let backend = MemoryBackend::new().fail_when_contains("CREATE OR REPLACE VIEW");
    let (migrator, _dir) = migrator(backend.clone());

    let err = migrator.apply_schema_changes(&mut state, &root, &to).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::StageFailed {
            stage: ExecutionStage::ViewsCreated,
            ..
        }
    ));
    assert_eq!(state, before);
    let pending = migrator.pending().unwrap().unwrap();
    assert_eq!(pending.stage, ExecutionStage::VersionActivated);
    assert_eq!(pending.plan.ghost_tables().len(), 2);

    backend.clear_failures();
    let report = migrator.apply_schema_changes(&mut state, &root, &to).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.ghost_tables, pending.plan.ghost_tables().iter().map(|t| t.name.clone()).collect::<Vec<_>>());
    assert!(migrator.pending().unwrap().is_none());

    let statements = committed_statements(&backend);
    let tables = statements
        .iter()
        .filter(|s| s.starts_with("CREATE TABLE IF NOT EXISTS"))
        .count();
    assert_eq!(tables, 2);
    let triggers = created_triggers(&statements);
    let recorded: std::collections::BTreeSet<String> =
        state.ref_log.syncs().map(|s| s.trigger_name.clone()).collect();
    assert_eq!(triggers, recorded);
    assert_eq!(
        statements
            .iter()
            .filter(|s| s.starts_with("CREATE OR REPLACE VIEW"))
            .count(),
        1
    );
    assert_eq!(migrator.store().load().unwrap(), Some(state));
}

#[test]
fn test_discard_pending_removes_committed_objects() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let to = add_email_with_view(&mut state);
    let backend = MemoryBackend::new().fail_when_contains("CREATE OR REPLACE VIEW");
    let (migrator, _dir) = migrator(backend.clone());

    migrator.apply_schema_changes(&mut state, &root, &to).unwrap_err();
    let triggers = created_triggers(&committed_statements(&backend));
    assert_eq!(triggers.len(), 4);

    let pending = migrator.discard_pending().unwrap().unwrap();
    let discarded = backend.committed().last().cloned().unwrap();
    for ghost in pending.plan.ghost_tables() {
        assert!(discarded.contains(&format!("DROP TABLE IF EXISTS \"{}\" CASCADE", ghost.name)));
    }
    for trigger in &triggers {
        assert!(discarded
            .iter()
            .any(|s| s.starts_with(&format!("DROP TRIGGER IF EXISTS \"{trigger}\""))));
    }
    let first_table = discarded.iter().position(|s| s.starts_with("DROP TABLE")).unwrap();
    let last_trigger = discarded.iter().rposition(|s| s.starts_with("DROP TRIGGER")).unwrap();
    assert!(last_trigger < first_table);
    assert!(migrator.pending().unwrap().is_none());
    assert!(migrator.discard_pending().unwrap().is_none());

    backend.clear_failures();
    let report = migrator.apply_schema_changes(&mut state, &root, &to).unwrap();
    assert!(report.is_complete());
    for ghost in pending.plan.ghost_tables() {
        assert!(!report.ghost_tables.contains(&ghost.name));
    }
}

#[test]
fn test_unfinished_migration_blocks_other_changes() {
    let mut state = shop();
    let root = state.changelog.root().id.clone();
    let ids = append(
        &mut state,
        vec![
            SchemaOperation::add_column("users", Column::new("email", ColumnType::Text)).into(),
            SchemaOperation::create_view("user_emails", "SELECT id, email FROM users").into(),
        ],
    );
    let backend = MemoryBackend::new().fail_when_contains("CREATE OR REPLACE VIEW");
    let (migrator, _dir) = migrator(backend.clone());
    migrator.apply_schema_changes(&mut state, &root, &ids[1]).unwrap_err();
    backend.clear_failures();

    assert!(matches!(
        migrator.apply_schema_changes(&mut state, &root, &ids[0]),
        Err(MigrationError::MigrationPending { .. })
    ));
    let data = append(&mut state, vec![Operation::data("DELETE FROM users")]);
    let statements = backend.statements().len();
    assert!(matches!(
        migrator.apply_data_changes(&mut state, &data),
        Err(MigrationError::MigrationPending { .. })
    ));
    assert_eq!(backend.statements().len(), statements);
}
