//! Property-based tests for handle construction and query shaping
//!
//! These tests verify that:
//! - Construction never fails and keeps or defaults every parameter
//! - A zero read limit is unconstrained and any other limit caps the scan
//! - The SQLite driver rejects table names that are not identifiers with
//!   `InvalidName` and accepts every identifier

#[cfg(test)]
mod tests {
    use dbhandle::config::parse_config;
    use dbhandle::core::db::{ConnectParams, Connection, Driver, Query, SqliteDriver};
    use dbhandle::core::HandleError;
    use dbhandle::testing::MockDriver;
    use dbhandle::{ConnectionHandle, ConnectionState, HandleConfig};
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn arb_name() -> impl Strategy<Value = String> {
        "[a-zA-Z_][a-zA-Z0-9_]{0,29}".prop_map(|s: String| s)
    }

    fn arb_invalid_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[0-9][a-zA-Z0-9_]{0,10}",
            "[a-zA-Z_]{1,8}[-; .\"'()*][a-zA-Z0-9_]{0,8}",
        ]
    }

    fn arb_config() -> impl Strategy<Value = HandleConfig> {
        (
            proptest::option::of("[a-z][a-z0-9.-]{0,20}"),
            proptest::option::of(1u16..=u16::MAX),
            proptest::option::of(arb_name()),
            proptest::option::of("[ -~]{0,16}"),
            proptest::option::of(arb_name()),
        )
            .prop_map(|(host, port, user, password, db)| {
                let mut config = HandleConfig::default();
                if let Some(host) = host {
                    config = config.with_host(host);
                }
                if let Some(port) = port {
                    config = config.with_port(port);
                }
                if let Some(user) = user {
                    config = config.with_user(user);
                }
                if let Some(password) = password {
                    config = config.with_password(password);
                }
                if let Some(db) = db {
                    config = config.with_db(db);
                }
                config
            })
    }

    proptest! {
        #[test]
        fn construction_never_fails(config in arb_config()) {
            let handle = ConnectionHandle::new(Arc::new(MockDriver::new()), config.clone(), None);
            prop_assert_eq!(handle.host(), config.host.as_str());
            prop_assert_eq!(handle.port(), config.port);
            prop_assert_eq!(handle.user(), config.user.as_str());
            prop_assert_eq!(handle.selected_database(), config.db.as_deref());
            prop_assert_eq!(handle.state(), ConnectionState::Unopened);
        }

        #[test]
        fn read_limit_shapes_query(db in arb_name(), table in arb_name(), limit in 0u64..10_000) {
            match Query::read(&db, &table, limit) {
                Query::Table { database, table: t, limit: l } => {
                    prop_assert_eq!(database, db);
                    prop_assert_eq!(t, table);
                    if limit == 0 {
                        prop_assert_eq!(l, None);
                    } else {
                        prop_assert_eq!(l, Some(limit));
                    }
                }
                other => prop_assert!(false, "unexpected query {:?}", other),
            }
        }

        #[test]
        fn config_keys_override_defaults(user in arb_name(), port in 1u16..=u16::MAX) {
            let text = format!("[connection]\nuser = \"{}\"\nport = {}\n", user, port);
            let config = parse_config(&text).unwrap();
            prop_assert_eq!(config.connection.user, user);
            prop_assert_eq!(config.connection.port, port);
            prop_assert_eq!(config.connection.host, "localhost");
            prop_assert_eq!(config.connection.password, "password");
        }
    }

    /// Runs `query` against a fresh SQLite session set up by `schema`
    fn run_on_shop(schema: &str, query: Query) -> Result<Vec<serde_json::Value>, HandleError> {
        let dir = TempDir::new().unwrap();
        rusqlite::Connection::open(dir.path().join("shop.sqlite"))
            .unwrap()
            .execute_batch(schema)
            .unwrap();
        let driver = SqliteDriver::new(dir.path());
        let defaults = HandleConfig::default();
        let params = ConnectParams {
            host: defaults.host,
            port: defaults.port,
            user: defaults.user,
            password: defaults.password,
            db: None,
            timeout: Duration::from_secs(1),
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let conn = driver.connect(&params).await.unwrap();
            conn.run(&query).await?.to_array()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn sqlite_driver_rejects_invalid_table_names(table in arb_invalid_name()) {
            let result = run_on_shop(
                "CREATE TABLE orders (id INTEGER PRIMARY KEY);",
                Query::read("shop", &table, 0),
            );
            prop_assert!(matches!(result, Err(HandleError::InvalidName(_))), "accepted {:?}", table);
        }

        #[test]
        fn sqlite_driver_accepts_identifiers(
            table in arb_name().prop_filter("reserved by sqlite", |t| !t.to_ascii_lowercase().starts_with("sqlite_"))
        ) {
            let schema = format!("CREATE TABLE \"{}\" (id INTEGER PRIMARY KEY);", table);
            let rows = run_on_shop(&schema, Query::read("shop", &table, 0)).unwrap();
            prop_assert!(rows.is_empty());
        }
    }
}
