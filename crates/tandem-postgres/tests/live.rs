//! Runs a migration against a live database. Needs `DATABASE_URL`:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/tandem_test cargo test -p tandem-postgres -- --ignored
//! ```

use tandem_core::{
    Backend, Catalog, Column, ColumnType, Connection, Migrator, SchemaOperation, State, StateStore, Table,
};
use tandem_postgres::PostgresBackend;

fn run(backend: &PostgresBackend, sql: &str) -> u64 {
    let mut conn = backend.connect().unwrap();
    conn.execute(sql).unwrap()
}

#[test]
#[ignore = "requires a running PostgreSQL and DATABASE_URL"]
fn test_ghost_table_is_filled_and_kept_in_sync() {
    let backend = PostgresBackend::from_env().unwrap();
    run(&backend, "DROP TABLE IF EXISTS tandem_live_users CASCADE");
    run(
        &backend,
        "CREATE TABLE tandem_live_users (id integer PRIMARY KEY, name text NOT NULL)",
    );
    run(
        &backend,
        "INSERT INTO tandem_live_users (id, name) VALUES (1, 'ada'), (2, 'grace')",
    );

    let users = Table::new("tandem_live_users")
        .with_column(Column::new("id", ColumnType::Integer).primary_key())
        .with_column(Column::new("name", ColumnType::Text).not_null());
    let mut state = State::bootstrap(Catalog::new("live").with_table(users).unwrap()).unwrap();
    let root = state.changelog.root().id.clone();
    let ids = state
        .changelog
        .add_change_set(
            "live",
            None,
            vec![SchemaOperation::add_column(
                "tandem_live_users",
                Column::new("email", ColumnType::Text),
            )
            .into()],
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let migrator = Migrator::new(backend, StateStore::open(&db).unwrap());
    migrator.apply_schema_changes(&mut state, &root, &ids[0]).unwrap();

    let ghost = state
        .ref_log
        .table_ref(&ids[0], "tandem_live_users")
        .unwrap()
        .ref_id
        .clone();
    let backend = migrator.backend();
    assert_eq!(run(backend, &format!("UPDATE \"{ghost}\" SET name = name")), 2);

    // Writes to the original reach the ghost and the other way round.
    run(backend, "INSERT INTO tandem_live_users (id, name) VALUES (3, 'edsger')");
    assert_eq!(run(backend, &format!("UPDATE \"{ghost}\" SET name = name")), 3);
    run(
        backend,
        &format!("INSERT INTO \"{ghost}\" (id, name, email) VALUES (4, 'barbara', 'b@x')"),
    );
    assert_eq!(run(backend, "UPDATE tandem_live_users SET name = name"), 4);

    run(backend, &format!("DROP TABLE IF EXISTS \"{ghost}\" CASCADE"));
    run(backend, "DROP TABLE IF EXISTS tandem_live_users CASCADE");
}
