use super::*;

#[tokio::test]
async fn stores_and_lists_foods_by_name() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let sushi = storage
        .insert_food("sushi", Some("rice and fish"))
        .await
        .expect("sushi");
    storage.insert_food("pizza", None).await.expect("pizza");

    let foods = storage.list_foods().await.expect("list");
    let names: Vec<_> = foods.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["pizza", "sushi"]);

    let fetched = storage.food(sushi).await.expect("food").expect("present");
    assert_eq!(fetched.description.as_deref(), Some("rice and fish"));
}

#[tokio::test]
async fn reinserting_a_food_keeps_its_id_and_description() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage
        .insert_food("ramen", Some("noodle soup"))
        .await
        .expect("first");
    let second = storage.insert_food("  ramen ", None).await.expect("second");
    assert_eq!(first, second);

    let food = storage.food(first).await.expect("food").expect("present");
    assert_eq!(food.description.as_deref(), Some("noodle soup"));
    assert_eq!(storage.list_foods().await.expect("list").len(), 1);
}

#[tokio::test]
async fn rejects_blank_food_names() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let err = storage.insert_food("   ", None).await.expect_err("blank");
    assert!(err.to_string().contains("empty"));
}

#[tokio::test]
async fn missing_food_is_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.food(FoodId(42)).await.expect("query").is_none());
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn health_check_fails_after_close() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.close().await;
    assert!(storage.health_check().await.is_err());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("seefood_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("foods.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    storage.close().await;

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn sqlite_path_ignores_memory_and_foreign_urls() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(sqlite_path("postgres://db/foods"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/foods.db?mode=rwc"),
        Some(PathBuf::from("./data/foods.db"))
    );
}
