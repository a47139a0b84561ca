//! Integration tests for collection and database handles.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use quarry::prelude::*;
use quarry::{FilterBuilder, UpdateDocument};

fn id_at(at: DateTime<Utc>, serial: u8) -> ObjectId {
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&(at.timestamp() as u32).to_be_bytes());
    bytes[11] = serial;
    ObjectId::from_bytes(bytes)
}

#[tokio::test]
async fn test_find_by_date_window() {
    let store = Arc::new(MemoryStore::new("batman_archive"));
    let cases = Database::new(store).collection("cases");
    let opened = [
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 5).unwrap(),
        Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2022, 7, 4, 8, 30, 0).unwrap(),
    ];
    for (serial, at) in opened.iter().enumerate() {
        cases
            .insert()
            .one(&doc! { "_id": id_at(*at, serial as u8), "serial": serial as i32 })
            .await
            .unwrap();
    }

    let after = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
    let before = Utc.with_ymd_and_hms(2021, 12, 31, 0, 0, 0).unwrap();
    let found = cases
        .find_by_date(Some(after), Some(before), doc! {})
        .all::<Document>()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_i32("serial").unwrap(), 1);

    let since = cases
        .find_by_date(Some(after), None, doc! { "serial": { "$gt": 1 } })
        .count()
        .await
        .unwrap();
    assert_eq!(since, 1);
}

#[tokio::test]
async fn test_upsert_helpers_and_builders() {
    let store = Arc::new(MemoryStore::new("batman_archive"));
    let enemies = Database::new(store).collection("enemies");

    let filter = FilterBuilder::new().eq("name", "Scarecrow").build();
    let created = enemies
        .upsert_one(filter.clone(), UpdateDocument::new().set("fear", 10))
        .await
        .unwrap();
    assert_eq!(created.matched, 0);
    let id = created.upserted_id.unwrap();

    let updated = enemies
        .upsert_by_id(id.clone(), UpdateDocument::new().inc("fear", 5))
        .await
        .unwrap();
    assert_eq!((updated.matched, updated.modified), (1, 1));
    assert!(updated.upserted_id.is_none());

    let scarecrow: Document = enemies.find_by_id(id.clone()).await.unwrap();
    assert_eq!(scarecrow.get_i32("fear").unwrap(), 15);

    assert_eq!(enemies.delete_by_id(id).await.unwrap(), 1);
    assert_eq!(enemies.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_database_listing_and_drop() {
    let store = Arc::new(MemoryStore::new("batman_archive"));
    let db = Database::new(store);
    db.c("enemies").insert().one(&doc! { "name": "Joker" }).await.unwrap();
    db.c("allies").insert().one(&doc! { "name": "Robin" }).await.unwrap();

    let mut names = db.collection_names().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["allies", "enemies"]);

    db.c("allies").drop().await.unwrap();
    let remaining: Vec<String> = db
        .list_collections()
        .await
        .unwrap()
        .iter()
        .map(|collection| collection.name().to_string())
        .collect();
    assert_eq!(remaining, vec!["enemies"]);

    let index = db.c("enemies").index(["name"]).ensure().await.unwrap();
    assert_eq!(index, "name_1");

    db.drop().await.unwrap();
    assert!(db.collection_names().await.unwrap().is_empty());
}
