//! Declaration-time checks against the introspected schema

use crate::common;

use dbvalidations::adapters::Engine;
use dbvalidations::config::Settings;
use dbvalidations::db::schema::{Index, TableSchema};
use dbvalidations::db::{Session, Value};
use dbvalidations::error::{ConfigError, SaveError};
use dbvalidations::model::{Entity, Model};
use dbvalidations::persistence::save;
use dbvalidations::registry::UniquenessOptions;

#[tokio::test]
async fn test_missing_index_fails_before_any_write() {
    for engine in common::ENGINES {
        let db = common::database(engine, vec![common::entities_without_index()]).await;
        let result = Model::define("Entity", db.adapter("entities").await, &Settings::default(), |d| {
            d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new())
        });

        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::IndexNotFound(_)), "{engine}");
        assert!(err.to_string().starts_with(
            "No unique index found with columns: [\"field\"] in table \"entities\". Available indexes are: []."
        ));
        assert_eq!(db.row_count("entities").await, 0);
    }
}

#[tokio::test]
async fn test_index_name_with_two_attributes() {
    let db = common::database(Engine::Postgresql, vec![common::entities_with_index()]).await;
    let err = Model::define("Entity", db.adapter("entities").await, &Settings::default(), |d| {
        d.validates_db_uniqueness_of(
            &["field", "other"],
            UniquenessOptions::new().index_name("custom_idx"),
        )
    })
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "When index_name is provided validator can have only one attribute. Got: [\"field\", \"other\"]"
    );
}

#[tokio::test]
async fn test_unsupported_options_per_engine() {
    let cases = [
        (Engine::Sqlite, UniquenessOptions::new().index_name("index_entities_on_field"), "index_name"),
        (Engine::Sqlite, UniquenessOptions::new().case_sensitive(false), "case_sensitive"),
        (Engine::Mysql, UniquenessOptions::new().where_clause("(field IS NOT NULL)"), "where"),
        (Engine::Mysql, UniquenessOptions::new().case_sensitive(true), "case_sensitive"),
    ];

    for (engine, options, expected) in cases {
        let db = common::database(engine, vec![common::entities_with_index()]).await;
        let err = Model::define("Entity", db.adapter("entities").await, &Settings::default(), |d| {
            d.validates_db_uniqueness_of(&["field"], options)
        })
        .unwrap_err();

        match err {
            ConfigError::OptionNotSupported { option, database, .. } => {
                assert_eq!(option, expected);
                assert_eq!(database, engine.name());
            }
            other => panic!("{engine}: unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_postgres_partial_and_expression_indexes() {
    let db = common::database(
        Engine::Postgresql,
        vec![
            TableSchema::new("entities")
                .with_index(Index::new("index_active_field", ["field"]).with_where("(deleted_at IS NULL)"))
                .with_index(Index::expression("index_lower_email", "lower((email)::text)")),
        ],
    )
    .await;

    let model = Model::define("Entity", db.adapter("entities").await, &Settings::default(), |d| {
        d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new().where_clause("(deleted_at IS NULL)"))?;
        d.validates_db_uniqueness_of(
            &["email"],
            UniquenessOptions::new().index_name("index_lower_email").case_sensitive(false),
        )
    })
    .unwrap();
    assert_eq!(model.chain().uniqueness_rules().len(), 2);

    let err = Model::define("Entity", db.adapter("entities").await, &Settings::default(), |d| {
        d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new())
    })
    .unwrap_err();
    assert!(err.to_string().contains("columns: [\"field\"] and where: (deleted_at IS NULL)"));
}

#[tokio::test]
async fn test_escape_hatch_registers_without_index() {
    let db = common::database(Engine::Postgresql, vec![common::entities_without_index()]).await;
    let model = Model::define(
        "Entity",
        db.adapter("entities").await,
        &Settings::skipping_index_check(),
        |d| d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new()),
    )
    .unwrap();

    assert_eq!(model.chain().uniqueness_rules().len(), 1);
    assert_eq!(model.chain().uniqueness_rules()[0].backing_index(), None);

    // Without an index nothing stops the duplicate
    let mut session = db.session();
    save(&model, &mut session, &mut Entity::new().with("field", "a")).await.unwrap();
    save(&model, &mut session, &mut Entity::new().with("field", "a")).await.unwrap();
    assert_eq!(db.count_where("entities", "field", &Value::from("a")).await, 2);
}

#[tokio::test]
async fn test_escape_hatch_from_settings_file() {
    let dir = std::env::temp_dir().join(format!("dbvalidations-settings-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    std::fs::write(&path, "skip_index_check = true\n").unwrap();

    let settings = Settings::load_from(&path).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    let db = common::database(Engine::Mysql, vec![common::entities_without_index()]).await;
    assert!(
        Model::define("Entity", db.adapter("entities").await, &settings, |d| {
            d.validates_db_uniqueness_of(&["field"], UniquenessOptions::new())
        })
        .is_ok()
    );
}

#[tokio::test]
async fn test_schema_load_failure() {
    let db = common::database(Engine::Postgresql, vec![]).await;
    let err = dbvalidations::adapters::SchemaAdapter::load(&mut db.session(), "missing")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no such table: missing"));
}

#[tokio::test]
async fn test_raw_error_when_table_missing() {
    let db = common::database(Engine::Postgresql, vec![common::entities_with_index()]).await;
    let model = Model::define("Entity", db.adapter("entities").await, &Settings::default(), |_| Ok(()))
        .unwrap();
    let mut session = db.session();

    let err = session.insert("missing", &[]).await.unwrap_err();
    assert!(!err.is_constraint_violation());

    save(&model, &mut session, &mut Entity::new().with("field", "a")).await.unwrap();
    let err = save(&model, &mut session, &mut Entity::new().with("field", "a")).await.unwrap_err();
    assert!(matches!(err, SaveError::Database(_)));
}
