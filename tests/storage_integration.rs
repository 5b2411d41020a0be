use std::env;

use rust_people_api::data::db::Database;
use rust_people_api::data::db_storage::PersonStorage;
use rust_people_api::models::{Gender, NewPerson, Pagination, PersonFilter, UpdatePersonRequest};

/// Integration smoke test for person storage against a real PostgreSQL.
/// Marked ignored so it never touches a live database by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn person_lifecycle_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.migrate().await?;
    let storage = PersonStorage::new(db.pool.clone());

    let created = storage
        .create(&NewPerson {
            name: "Smoke".to_string(),
            surname: "Tester".to_string(),
            gender: Some(Gender::Other),
            age: Some(40),
            nationality: Some("NL".to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(created.age, Some(40));

    let fetched = storage
        .get(created.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("created person not found"))?;
    assert_eq!(fetched.surname, "Tester");

    let listed = storage
        .list(
            &PersonFilter {
                surname: Some("tEsT".to_string()),
                nationality: Some("NL".to_string()),
                ..Default::default()
            },
            Pagination { limit: 100, offset: 0 },
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(listed.iter().any(|p| p.id == created.id));

    let patched = storage
        .patch(
            created.id,
            &UpdatePersonRequest {
                age: Some(41),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("patched person not found"))?;
    assert_eq!(patched.age, Some(41));
    assert_eq!(patched.gender, Some(Gender::Other));

    let deleted = storage
        .delete(created.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(deleted);
    assert!(!storage
        .exists(created.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?);

    Ok(())
}
