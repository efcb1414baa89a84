//! Manual e2e tests against a live MOLGENIS server.
//! These require a running server with a `Person`-like entity (columns `age` and `gender`, an
//! auto id) and environment variables:
//!   ENDPOINT=".." USERNAME=".." PASSWORD=".." ENTITY=".."

use std::env;

use molgenis_client::models::Query;
use molgenis_client::{ClientConfig, MolgenisClient, Row};
use serde_json::json;
use tracing::info;

type TestError = Box<dyn std::error::Error + Send + Sync>;

async fn connect() -> Result<(MolgenisClient, String), TestError> {
    let endpoint = env::var("ENDPOINT").expect("ENDPOINT environment variable not set");
    let username = env::var("USERNAME").expect("USERNAME environment variable not set");
    let password = env::var("PASSWORD").expect("PASSWORD environment variable not set");
    let entity = env::var("ENTITY").expect("ENTITY environment variable not set");

    let config = ClientConfig::builder(&endpoint, &username, &password).build()?;
    let client = MolgenisClient::connect(config).await?;
    Ok((client, entity))
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

// Run with: ENDPOINT=".." USERNAME=".." PASSWORD=".." ENTITY=".." cargo t -p molgenis-client read_metadata -- --ignored
#[ignore]
#[tokio::test]
async fn read_metadata() -> Result<(), TestError> {
    let (mut client, entity) = connect().await?;

    let metadata = client.entity_metadata(&entity).await?;
    info!("[METADATA] {:?}", metadata);
    let id_attribute = client.id_attribute(&entity).await?;
    let id_type = client.column_type(&entity, &id_attribute).await?;
    println!("id attribute {id_attribute} has type {id_type:?}");

    client.logout().await?;
    Ok(())
}

// Run with: ENDPOINT=".." USERNAME=".." PASSWORD=".." ENTITY=".." cargo t -p molgenis-client add_update_delete_row -- --ignored
#[ignore]
#[tokio::test]
async fn add_update_delete_row() -> Result<(), TestError> {
    let (mut client, entity) = connect().await?;

    let id = client
        .add_row(&entity, &row(json!({"age": "26", "gender": "Male"})), true)
        .await?;
    let by_id = Query::equals(client.id_attribute(&entity).await?, id.as_str());

    let rows = client.query_rows(&entity, &by_id).await?;
    assert_eq!(rows.items.len(), 1);

    let outcomes = client
        .update_rows(&entity, &by_id, &row(json!({"age": "27"})))
        .await?;
    assert!(outcomes.iter().all(|outcome| outcome.is_success()));

    let rows = client.query_rows(&entity, &by_id).await?;
    assert_eq!(rows.items[0]["age"], json!(27));

    let outcomes = client.delete_rows(&entity, &by_id).await?;
    assert!(outcomes.iter().all(|outcome| outcome.is_success()));

    client.logout().await?;
    Ok(())
}
