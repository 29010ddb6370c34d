use crate::*;
use chrono::{DateTime, NaiveDate, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Sets up a test database with migrations applied
///
/// This function:
/// 1. Creates an in-memory SQLite database
/// 2. Enables foreign key constraints (through the pool's connection customizer)
/// 3. Runs all migrations to set up the schema
///
/// ### Returns
///
/// An Arc-wrapped database connection pool connected to the in-memory database
pub fn setup_test_db() -> Arc<db::DbPool> {
    // Use a unique shared in-memory database for each test.
    // Plain ":memory:" gives each connection its own separate database,
    // so migrations run on one connection wouldn't be visible on others.
    let unique_id = uuid::Uuid::new_v4();
    let database_url = format!("file:test_{}?mode=memory&cache=shared", unique_id);
    let pool = db::init_pool(&database_url).expect("Failed to create pool");

    // Run all migrations to set up the schema
    let mut conn = pool.get().expect("Failed to get connection");
    run_migrations(&mut conn).expect("Failed to run migrations");
    drop(conn);

    Arc::new(pool)
}

#[tokio::test]
async fn test_setup_test_db_creates_tables() {
    use diesel::RunQueryDsl;
    use diesel::QueryableByName;
    use diesel::sql_types::Text;

    #[derive(QueryableByName, Debug)]
    struct TableName {
        #[diesel(sql_type = Text)]
        name: String,
    }

    let pool = setup_test_db();
    let mut conn = pool.get().unwrap();

    let table_names: Vec<TableName> =
        diesel::sql_query("SELECT name FROM sqlite_master WHERE type='table'")
            .load(&mut conn)
            .expect("Failed to load table names");
    let names: HashSet<String> = table_names.into_iter().map(|t| t.name).collect();

    for expected in [
        "users",
        "courses",
        "sections",
        "student_assignments",
        "tasks",
        "task_notifications",
        "grades",
        "attendance",
    ] {
        assert!(names.contains(expected), "missing table {}", expected);
    }
}

/// Generates a lower-case UUID v4 string
pub fn arb_uuid() -> impl Strategy<Value = String> {
    any::<u128>().prop_map(|bits| uuid::Builder::from_random_bytes(bits.to_le_bytes()).into_uuid().to_string())
}

/// Generates strings mixing whitespace, hyphens, hex and unicode
pub fn arb_messy_string() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC*",
        "[0-9a-fA-F\\- ]{0,80}",
        "[a-zA-ZáéíóúñÑ ]{0,40}",
    ]
}

/// Generates an arbitrary DateTime<Utc> within 2020-01-01 to 2030-01-01
pub fn arb_datetime_utc() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..1_893_456_000i64)
        .prop_map(|ts| DateTime::from_timestamp(ts, 0).unwrap())
}

/// Generates a date in the 2024 or 2025 school year
pub fn arb_school_date() -> impl Strategy<Value = NaiveDate> {
    (2024i32..=2025, 3u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

/// Generates a valid score in [0.0, 100.0] with one decimal
///
/// Uses integer-then-divide so both bounds are reachable exactly.
pub fn arb_score() -> impl Strategy<Value = f64> {
    (0u32..=1000u32).prop_map(|v| v as f64 / 10.0)
}

/// Generates a score outside [0.0, 100.0]
pub fn arb_invalid_score() -> impl Strategy<Value = f64> {
    prop_oneof![
        (-1000.0f64..-0.01f64),
        (100.01f64..1000.0f64),
        Just(f64::NAN),
        Just(f64::INFINITY),
    ]
}

/// Generates the numeric part of a RUT
pub fn arb_rut_number() -> impl Strategy<Value = u32> {
    1_000_000u32..=29_999_999u32
}

/// Removes duplicates from a list of names, keeping the first occurrence
pub fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
