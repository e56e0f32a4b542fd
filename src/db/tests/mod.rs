//! Shared database repository test infrastructure
//!
//! The same test logic runs against both SQLite and PostgreSQL:
//!
//! - **SQLite**: fast, in-memory, runs with every `cargo test`
//! - **PostgreSQL**: testcontainers-backed, run with `cargo test -- --ignored`
//!
//! Each module holds shared `async fn test_*(db: &DbPool)` functions plus a
//! `sqlite_tests` and a `postgres_tests` module that instantiate them.

/// Instantiate shared `test_*(db: &DbPool)` functions for every enabled backend.
macro_rules! backend_tests {
    ($($name:ident),* $(,)?) => {
        #[cfg(feature = "database-sqlite")]
        mod sqlite_tests {
            $(
                #[tokio::test]
                async fn $name() {
                    let db = crate::db::tests::harness::sqlite_db().await;
                    super::$name(&db).await;
                }
            )*
        }

        #[cfg(feature = "database-postgres")]
        mod postgres_tests {
            $(
                #[tokio::test]
                #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
                async fn $name() {
                    let db = crate::db::tests::harness::postgres::postgres_db().await;
                    super::$name(&db).await;
                }
            )*
        }
    };
}

mod api_keys;
mod organizations;
