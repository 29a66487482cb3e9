//! Foreign key violations translated into "must exist" errors

use crate::common;

use dbvalidations::adapters::Engine;
use dbvalidations::config::Settings;
use dbvalidations::db::Value;
use dbvalidations::error::{ConfigError, SaveError};
use dbvalidations::model::{Association, Entity, ErrorKind, Model, Record};
use dbvalidations::persistence::{SaveOptions, save, save_with};
use dbvalidations::validate;

async fn user_model(db: &common::MemoryDatabase) -> Model {
    Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
        d.db_belongs_to("company")
    })
    .expect("foreign key exists")
}

async fn seeded(engine: Engine) -> common::MemoryDatabase {
    let db = common::database(engine, vec![common::companies(), common::users()]).await;
    let companies = Model::define("Company", db.adapter("companies").await, &Settings::default(), |_| Ok(()))
        .unwrap();
    save(&companies, &mut db.session(), &mut Entity::new().with("id", 1))
        .await
        .unwrap();
    db
}

#[tokio::test]
async fn test_missing_parent_is_required_error() {
    for engine in [Engine::Postgresql, Engine::Mysql] {
        let db = seeded(engine).await;
        let model = user_model(&db).await;
        let mut session = db.session();

        let mut user = Entity::new().with("company_id", -1);
        let err = save(&model, &mut session, &mut user).await.unwrap_err();

        assert!(matches!(err, SaveError::Invalid(_)), "{engine}: {err:?}");
        assert_eq!(user.attribute("company_id"), Value::Null, "{engine}");
        assert_eq!(user.association("company"), Association::Absent);
        assert!(user.errors().added("company", ErrorKind::Required));
        assert_eq!(err.to_string(), "Validation failed: Company must exist");
        assert_eq!(db.row_count("users").await, 0);
    }
}

#[tokio::test]
async fn test_existing_parent_saves() {
    let db = seeded(Engine::Postgresql).await;
    let model = user_model(&db).await;

    let mut user = Entity::new().with("company_id", 1);
    save(&model, &mut db.session(), &mut user).await.unwrap();

    assert!(user.errors().is_empty());
    assert_eq!(db.count_where("users", "company_id", &Value::Int(1)).await, 1);
}

#[tokio::test]
async fn test_blank_foreign_key_fails_before_writing() {
    let db = seeded(Engine::Postgresql).await;
    let model = user_model(&db).await;

    let mut user = Entity::new();
    let err = save(&model, &mut db.session(), &mut user).await.unwrap_err();

    assert!(matches!(err, SaveError::Invalid(_)));
    assert!(user.errors().added("company", ErrorKind::Required));
    assert_eq!(db.row_count("users").await, 0);
}

#[tokio::test]
async fn test_loaded_association_passes_precheck() {
    let db = seeded(Engine::Postgresql).await;
    let model = user_model(&db).await;

    // The raw column is what gets written; a loaded association alone
    // satisfies the pre-check and the nullable column is accepted.
    let mut user = Entity::new().with_association("company", Association::Loaded(Value::Int(1)));
    save(&model, &mut db.session(), &mut user).await.unwrap();
    assert_eq!(db.row_count("users").await, 1);
}

#[tokio::test]
async fn test_skipping_validation_still_translates() {
    let db = seeded(Engine::Mysql).await;
    let model = user_model(&db).await;

    let mut user = Entity::new().with("company_id", 42);
    let err = save_with(&model, &mut db.session(), &mut user, SaveOptions::skip_validation())
        .await
        .unwrap_err();

    assert!(matches!(err, SaveError::Invalid(_)));
    assert!(user.errors().added("company", ErrorKind::Required));
}

#[tokio::test]
async fn test_sqlite_rejects_belongs_to() {
    let db = common::database(Engine::Sqlite, vec![common::companies(), common::users()]).await;
    let result = Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
        d.db_belongs_to("company")
    });

    match result {
        Err(ConfigError::UnsupportedDatabase { method, database }) => {
            assert_eq!(method, "db_belongs_to");
            assert_eq!(database, "sqlite3");
        }
        other => panic!("expected UnsupportedDatabase, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_foreign_key_lists_known_keys() {
    let db = seeded(Engine::Postgresql).await;
    let err = Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
        d.db_belongs_to("owner")
    })
    .unwrap_err();

    assert!(err.to_string().starts_with(
        "No foreign key found with column: \"owner_id\". Found foreign keys are: [\"company_id\"]."
    ));
}

#[tokio::test]
async fn test_explicit_foreign_key_column() {
    let db = seeded(Engine::Postgresql).await;
    let model = Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
        d.db_belongs_to_with_foreign_key("employer", "company_id")
    })
    .unwrap();

    let mut user = Entity::new().with("company_id", 7);
    save(&model, &mut db.session(), &mut user).await.unwrap_err();

    assert!(user.errors().added("employer", ErrorKind::Required));
    assert_eq!(user.association("employer"), Association::Absent);
}

#[tokio::test]
async fn test_presence_of_association_translates() {
    for engine in [Engine::Postgresql, Engine::Mysql, Engine::Sqlite] {
        let db = seeded(engine).await;
        let model = Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
            d.validates_db_presence_of(&["company"])
        })
        .unwrap();

        let mut user = Entity::new().with("company_id", -1);
        let err = save(&model, &mut db.session(), &mut user).await.unwrap_err();

        assert!(matches!(err, SaveError::Invalid(_)), "{engine}: {err:?}");
        assert!(user.errors().added("company", ErrorKind::Required), "{engine}");
        assert_eq!(user.attribute("company_id"), Value::Null);
        assert_eq!(user.association("company"), Association::Absent);
        assert_eq!(db.row_count("users").await, 0);
    }
}

#[tokio::test]
async fn test_presence_of_association_trusts_set_foreign_key() {
    let db = seeded(Engine::Postgresql).await;
    let model = Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
        d.validates_db_presence_of(&["company"])
    })
    .unwrap();
    let mut session = db.session();

    let mut dangling = Entity::new().with("company_id", 99);
    assert!(validate(&model, &mut session, &mut dangling).await.unwrap());

    let mut blank = Entity::new();
    assert!(!validate(&model, &mut session, &mut blank).await.unwrap());
    assert!(blank.errors().added("company", ErrorKind::Required));
}

#[tokio::test]
async fn test_presence_of_blank_attribute() {
    let db = seeded(Engine::Sqlite).await;
    let model = Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
        d.validates_db_presence_of(&["name"])
    })
    .unwrap();
    let mut session = db.session();

    let mut user = Entity::new().with("name", "  ");
    let err = save(&model, &mut session, &mut user).await.unwrap_err();
    assert_eq!(err.to_string(), "Validation failed: Name can't be blank");
    assert!(user.errors().added("name", ErrorKind::Blank));
    assert_eq!(db.row_count("users").await, 0);

    let mut named = Entity::new().with("name", "Ada");
    assert!(validate(&model, &mut session, &mut named).await.unwrap());
    save(&model, &mut session, &mut named).await.unwrap();
    assert_eq!(db.row_count("users").await, 1);
}

#[tokio::test]
async fn test_presence_of_foreign_key_column() {
    let db = seeded(Engine::Mysql).await;
    let model = Model::define("User", db.adapter("users").await, &Settings::default(), |d| {
        d.validates_db_presence_of(&["company_id"])
    })
    .unwrap();

    let mut user = Entity::new().with("company_id", 5);
    let err = save(&model, &mut db.session(), &mut user).await.unwrap_err();

    assert!(matches!(err, SaveError::Invalid(_)));
    assert!(user.errors().added("company_id", ErrorKind::Blank));
    assert_eq!(user.attribute("company_id"), Value::Null);
    assert_eq!(err.to_string(), "Validation failed: Company can't be blank");
}
