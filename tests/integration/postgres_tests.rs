//! Integration tests for PostgresSession
//!
//! These tests require the test PostgreSQL database to be running.
//! Start it with: docker-compose -f docker-compose.test.yml up -d

use dbvalidations::adapters::SchemaAdapter;
use dbvalidations::config::{ConnectionConfig, Settings, SslMode};
use dbvalidations::db::postgres::PostgresSession;
use dbvalidations::db::schema::IndexColumns;
use dbvalidations::db::{Session, Value};
use dbvalidations::error::SaveError;
use dbvalidations::model::{Association, Entity, ErrorKind, Model, Record};
use dbvalidations::persistence::save;
use dbvalidations::registry::UniquenessOptions;

/// Get test database connection config
fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        host: std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5433),
        database: std::env::var("TEST_DB_NAME").unwrap_or_else(|_| "test_db".to_string()),
        username: std::env::var("TEST_DB_USER").unwrap_or_else(|_| "test_user".to_string()),
        password: Some(
            std::env::var("TEST_DB_PASSWORD").unwrap_or_else(|_| "test_password".to_string()),
        ),
        ssl_mode: SslMode::Disable,
    }
}

async fn connect() -> Option<PostgresSession> {
    let config = test_config();
    match PostgresSession::connect(&config).await {
        Ok((session, _)) => Some(session),
        Err(e) => {
            eprintln!(
                "Skipping test: Database not available at {}:{} - {}",
                config.host, config.port, e
            );
            None
        }
    }
}

/// Table names unique to one test, so suites can run in parallel
fn table(prefix: &str) -> String {
    format!("{}_{}", prefix, std::process::id())
}

#[tokio::test]
async fn test_connect_to_database() {
    let Some(session) = connect().await else {
        return;
    };
    assert_eq!(session.depth(), 0);
}

#[tokio::test]
async fn test_schema_introspection() {
    let Some(mut session) = connect().await else {
        return;
    };
    let companies = table("intro_companies");
    let users = table("intro_users");

    session
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {users}, {companies};
             CREATE TABLE {companies} (id serial PRIMARY KEY);
             CREATE TABLE {users} (
                 id serial PRIMARY KEY,
                 email text,
                 field_1 text,
                 field_2 text,
                 deleted_at timestamp,
                 company_id integer REFERENCES {companies} (id)
             );
             CREATE UNIQUE INDEX {users}_pair ON {users} (field_2, field_1);
             CREATE UNIQUE INDEX {users}_lower_email ON {users} (lower(email));
             CREATE UNIQUE INDEX {users}_active ON {users} (email) WHERE deleted_at IS NULL;"
        ))
        .await
        .unwrap();

    let adapter = SchemaAdapter::load(&mut session, &users).await.unwrap();
    session
        .batch_execute(&format!("DROP TABLE {users}, {companies};"))
        .await
        .unwrap();

    let pair = adapter.find_index_by_name(&format!("{users}_pair")).unwrap();
    assert_eq!(
        pair.columns,
        IndexColumns::Columns(vec!["field_2".into(), "field_1".into()])
    );

    let lower = adapter.find_index_by_name(&format!("{users}_lower_email")).unwrap();
    assert_eq!(lower.columns, IndexColumns::Expression("lower(email)".into()));

    let active = adapter.find_index_by_name(&format!("{users}_active")).unwrap();
    assert_eq!(active.where_clause.as_deref(), Some("(deleted_at IS NULL)"));

    let fk = adapter.find_foreign_key_by_column("company_id").unwrap();
    assert_eq!(fk.to_table, companies);
    assert_eq!(fk.primary_key, "id");
}

#[tokio::test]
async fn test_unique_violation_translated() {
    let Some(mut session) = connect().await else {
        return;
    };
    let entities = table("uniq_entities");
    session
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {entities};
             CREATE TABLE {entities} (id serial PRIMARY KEY, field text);
             CREATE UNIQUE INDEX {entities}_field ON {entities} (field);"
        ))
        .await
        .unwrap();

    let adapter = SchemaAdapter::load(&mut session, &entities).await.unwrap();
    let model = Model::define("Entity", adapter, &Settings::default(), |d| {
        d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new())
    })
    .unwrap();

    save(&model, &mut session, &mut Entity::new().with("field", "a")).await.unwrap();
    let mut duplicate = Entity::new().with("field", "a");
    let result = save(&model, &mut session, &mut duplicate).await;

    session
        .batch_execute(&format!("DROP TABLE {entities};"))
        .await
        .unwrap();

    assert!(matches!(result, Err(SaveError::Invalid(_))));
    let detail = duplicate.errors().on("field")[0];
    assert_eq!(detail.kind, ErrorKind::Taken);
    assert_eq!(detail.value, Some(Value::from("a")));
}

#[tokio::test]
async fn test_foreign_key_violation_translated() {
    let Some(mut session) = connect().await else {
        return;
    };
    let companies = table("fk_companies");
    let users = table("fk_users");
    session
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {users}, {companies};
             CREATE TABLE {companies} (id serial PRIMARY KEY);
             CREATE TABLE {users} (id serial PRIMARY KEY, company_id integer REFERENCES {companies} (id));"
        ))
        .await
        .unwrap();

    let adapter = SchemaAdapter::load(&mut session, &users).await.unwrap();
    let model = Model::define("User", adapter, &Settings::default(), |d| d.db_belongs_to("company")).unwrap();

    let mut user = Entity::new().with("company_id", -1);
    let result = save(&model, &mut session, &mut user).await;

    session
        .batch_execute(&format!("DROP TABLE {users}, {companies};"))
        .await
        .unwrap();

    assert!(matches!(result, Err(SaveError::Invalid(_))));
    assert_eq!(user.attribute("company_id"), Value::Null);
    assert_eq!(user.association("company"), Association::Absent);
    assert!(user.errors().added("company", ErrorKind::Required));
}

#[tokio::test]
async fn test_savepoint_keeps_outer_transaction() {
    let Some(mut session) = connect().await else {
        return;
    };
    let entities = table("sp_entities");
    session
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {entities};
             CREATE TABLE {entities} (id serial PRIMARY KEY, field text UNIQUE);"
        ))
        .await
        .unwrap();

    let adapter = SchemaAdapter::load(&mut session, &entities).await.unwrap();
    let model = Model::define("Entity", adapter, &Settings::default(), |d| {
        d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new())
    })
    .unwrap();

    session.begin_nested().await.unwrap();
    save(&model, &mut session, &mut Entity::new().with("field", "a")).await.unwrap();
    let failed = save(&model, &mut session, &mut Entity::new().with("field", "a")).await;
    let after = save(&model, &mut session, &mut Entity::new().with("field", "b")).await;
    session.commit_nested().await.unwrap();

    session
        .batch_execute(&format!("DROP TABLE {entities};"))
        .await
        .unwrap();

    assert!(matches!(failed, Err(SaveError::Invalid(_))));
    assert!(after.is_ok());
}

#[tokio::test]
async fn test_raw_begin_survives_failed_save() {
    let Some(mut session) = connect().await else {
        return;
    };
    let entities = table("raw_tx_entities");
    session
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {entities};
             CREATE TABLE {entities} (id serial PRIMARY KEY, field text UNIQUE);"
        ))
        .await
        .unwrap();

    let adapter = SchemaAdapter::load(&mut session, &entities).await.unwrap();
    let model = Model::define("Entity", adapter, &Settings::default(), |d| {
        d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new())
    })
    .unwrap();

    session.batch_execute("BEGIN").await.unwrap();
    save(&model, &mut session, &mut Entity::new().with("field", "a")).await.unwrap();
    let failed = save(&model, &mut session, &mut Entity::new().with("field", "a")).await;
    let after = save(&model, &mut session, &mut Entity::new().with("field", "b")).await;
    let depth = session.depth();
    session.batch_execute("COMMIT").await.unwrap();

    let has_a = dbvalidations::db::ExistsQuery::new(&entities).condition("field", Value::from("a"), true);
    let has_b = dbvalidations::db::ExistsQuery::new(&entities).condition("field", Value::from("b"), true);
    let kept_a = session.exists(&has_a).await.unwrap();
    let kept_b = session.exists(&has_b).await.unwrap();
    session
        .batch_execute(&format!("DROP TABLE {entities};"))
        .await
        .unwrap();

    assert!(matches!(failed, Err(SaveError::Invalid(_))));
    assert!(after.is_ok());
    assert_eq!(depth, 0);
    assert!(kept_a && kept_b);
}

#[tokio::test]
async fn test_concurrent_inserts_one_commits() {
    let (Some(mut setup), Some(mut left), Some(mut right)) = (connect().await, connect().await, connect().await) else {
        return;
    };
    let entities = table("race_entities");
    setup
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {entities};
             CREATE TABLE {entities} (id serial PRIMARY KEY, field text);
             CREATE UNIQUE INDEX {entities}_field ON {entities} (field);"
        ))
        .await
        .unwrap();

    let adapter = SchemaAdapter::load(&mut setup, &entities).await.unwrap();
    let model = Model::define("Entity", adapter, &Settings::default(), |d| {
        d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new())
    })
    .unwrap();

    let mut a = Entity::new().with("field", "dup");
    let mut b = Entity::new().with("field", "dup");
    let (ra, rb) = tokio::join!(
        save(&model, &mut left, &mut a),
        save(&model, &mut right, &mut b),
    );

    setup
        .batch_execute(&format!(
            "CREATE TEMP TABLE race_count AS SELECT count(*) AS n FROM {entities} WHERE field = 'dup';"
        ))
        .await
        .unwrap();
    let single_row = dbvalidations::db::ExistsQuery::new("race_count").condition("n", Value::Int(1), true);
    let exactly_one = setup.exists(&single_row).await.unwrap();
    setup
        .batch_execute(&format!("DROP TABLE race_count; DROP TABLE {entities};"))
        .await
        .unwrap();

    assert_eq!([ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if ra.is_ok() { &b } else { &a };
    assert!(loser.errors().added("field", ErrorKind::Taken));
    assert!(exactly_one);
}
