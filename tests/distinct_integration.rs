//! Integration tests for distinct values.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use quarry::prelude::*;

async fn years() -> Collection {
    let store = Arc::new(MemoryStore::new("batman_archive"));
    let enemies = Database::new(store).collection("enemies");
    enemies
        .insert()
        .many(vec![
            doc! { "name": "Bane", "year": 1993 },
            doc! { "name": "Joker", "year": 1940 },
            doc! { "name": "Penguin", "year": 1941 },
            doc! { "name": "Riddler", "year": 1948 },
            doc! { "name": "Two-Face", "year": 1942 },
        ])
        .await
        .unwrap();
    enemies
}

#[tokio::test]
async fn test_sorted_window_starts_at_third_smallest() {
    let enemies = years().await;

    let window = enemies
        .find(doc! {})
        .sort(["year"])
        .skip(2)
        .limit(2)
        .distinct("year")
        .await
        .unwrap();
    assert_eq!(window, vec![Bson::Int32(1942), Bson::Int32(1948)]);

    let ints = enemies
        .find(doc! {})
        .sort(["year"])
        .skip(2)
        .limit(2)
        .distinct_ints("year")
        .await
        .unwrap();
    assert_eq!(ints, vec![1942, 1948]);
}

#[tokio::test]
async fn test_descending_is_reverse_of_ascending() {
    let enemies = years().await;

    let ascending = enemies
        .find(doc! {})
        .sort(["year"])
        .distinct("year")
        .await
        .unwrap();
    let mut descending = enemies
        .find(doc! {})
        .sort(["-year"])
        .distinct("year")
        .await
        .unwrap();
    descending.reverse();
    assert_eq!(ascending.len(), 5);
    assert_eq!(ascending, descending);

    let names = enemies
        .find(doc! {})
        .sort(["-name"])
        .distinct_strings("name")
        .await
        .unwrap();
    assert_eq!(names, vec!["Two-Face", "Riddler", "Penguin", "Joker", "Bane"]);
}

#[tokio::test]
async fn test_typed_distinct_rejects_mixed_values() {
    let store = Arc::new(MemoryStore::new("batman_archive"));
    let counters = Database::new(store).collection("counters");
    counters
        .insert()
        .many(vec![
            doc! { "count": 1 },
            doc! { "count": 2_i64 },
            doc! { "count": "three" },
        ])
        .await
        .unwrap();

    let err = counters.find(doc! {}).distinct_ints("count").await.unwrap_err();
    assert!(err.is_wrong_type());

    let err = counters.find(doc! {}).distinct_f64s("count").await.unwrap_err();
    assert!(err.is_wrong_type());
}

#[tokio::test]
async fn test_filtered_distinct_dedupes() {
    let store = Arc::new(MemoryStore::new("batman_archive"));
    let sightings = Database::new(store).collection("sightings");
    sightings
        .insert()
        .many(vec![
            doc! { "who": "Joker", "district": "Narrows" },
            doc! { "who": "Joker", "district": "Narrows" },
            doc! { "who": "Bane", "district": "Narrows" },
            doc! { "who": "Joker", "district": "Old Gotham" },
        ])
        .await
        .unwrap();

    let mut districts = sightings
        .find(doc! { "who": "Joker" })
        .distinct_strings("district")
        .await
        .unwrap();
    districts.sort();
    assert_eq!(districts, vec!["Narrows", "Old Gotham"]);
}
