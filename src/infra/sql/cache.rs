//! Stored-procedure parameter cache.
//!
//! Discovery runs once per (target, procedure, return-value flag); every read
//! hands out a private clone of the stored template.

use std::sync::Arc;

use dashmap::DashMap;

use super::driver::SqlDriver;
use super::parameter::{ParameterDirection, SqlParameter};
use crate::config::RETURN_VALUE_KEY_SUFFIX;
use crate::errors::AppResult;

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub target: String,
    pub command_text: String,
    pub include_return_value: bool,
}

impl CacheKey {
    pub fn new(target: &str, command_text: &str, include_return_value: bool) -> Self {
        Self {
            target: target.to_string(),
            command_text: command_text.to_string(),
            include_return_value,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Connection strings can carry credentials; only the command is shown.
        write!(f, "{}", self.command_text)?;
        if self.include_return_value {
            write!(f, "{}", RETURN_VALUE_KEY_SUFFIX)?;
        }
        Ok(())
    }
}

/// Process-wide parameter template store.
///
/// Entries are never evicted. Concurrent misses on the same key may both run
/// discovery; the last insert wins.
pub struct ParameterCache {
    driver: Arc<dyn SqlDriver>,
    entries: DashMap<CacheKey, Arc<[SqlParameter]>>,
}

impl ParameterCache {
    pub fn new(driver: Arc<dyn SqlDriver>) -> Self {
        Self {
            driver,
            entries: DashMap::new(),
        }
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pre-seed a template for `command_text` without a discovery round-trip.
    pub fn cache_parameter_set(
        &self,
        target: &str,
        command_text: &str,
        parameters: Vec<SqlParameter>,
    ) {
        let key = CacheKey::new(target, command_text, false);
        tracing::debug!(key = %key, count = parameters.len(), "Seeding parameter cache");
        self.entries.insert(key, parameters.into());
    }

    /// Clone of a seeded template, if present.
    pub fn get_cached_parameter_set(
        &self,
        target: &str,
        command_text: &str,
    ) -> Option<Vec<SqlParameter>> {
        self.entries
            .get(&CacheKey::new(target, command_text, false))
            .map(|entry| entry.value().to_vec())
    }

    /// Parameters of `procedure` without the return-value parameter.
    pub async fn resolve_default(
        &self,
        target: &str,
        procedure: &str,
    ) -> AppResult<Vec<SqlParameter>> {
        self.resolve(target, procedure, false).await
    }

    /// Parameters of `procedure`, discovering them on first use.
    pub async fn resolve(
        &self,
        target: &str,
        procedure: &str,
        include_return_value: bool,
    ) -> AppResult<Vec<SqlParameter>> {
        let key = CacheKey::new(target, procedure, include_return_value);

        if let Some(entry) = self.entries.get(&key) {
            tracing::debug!(key = %key, "Parameter cache hit");
            return Ok(entry.value().to_vec());
        }

        tracing::debug!(key = %key, "Parameter cache miss, discovering");
        let discovered = self.discover(target, procedure, include_return_value).await?;
        let template: Arc<[SqlParameter]> = discovered.into();
        self.entries.insert(key, template.clone());

        Ok(template.to_vec())
    }

    async fn discover(
        &self,
        target: &str,
        procedure: &str,
        include_return_value: bool,
    ) -> AppResult<Vec<SqlParameter>> {
        let connection = self.driver.open(target).await?;
        let derived = connection.derive_parameters(procedure).await;
        if let Err(e) = connection.close().await {
            tracing::warn!("Failed to close discovery connection: {}", e);
        }

        let mut parameters = derived?;
        if !include_return_value
            && parameters
                .first()
                .map(|p| p.direction == ParameterDirection::ReturnValue)
                .unwrap_or(false)
        {
            parameters.remove(0);
        }

        Ok(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::infra::sql::driver::{MockSqlConnection, MockSqlDriver, SqlConnection};
    use crate::infra::sql::{SqlType, SqlValue};

    fn signature() -> Vec<SqlParameter> {
        vec![
            SqlParameter::typed("RETURN_VALUE", ParameterDirection::ReturnValue, SqlType::Integer, "integer"),
            SqlParameter::typed("customer_id", ParameterDirection::Input, SqlType::Integer, "integer"),
            SqlParameter::output("total", "numeric"),
        ]
    }

    fn driver_expecting(discoveries: usize) -> MockSqlDriver {
        let mut driver = MockSqlDriver::new();
        driver.expect_open().times(discoveries).returning(|_| {
            let mut connection = MockSqlConnection::new();
            connection
                .expect_derive_parameters()
                .times(1)
                .returning(|_| Ok(signature()));
            connection.expect_close().times(1).returning(|| Ok(()));
            Ok(Box::new(connection) as Box<dyn SqlConnection>)
        });
        driver
    }

    #[tokio::test]
    async fn test_miss_discovers_once_and_hits_reuse() {
        let cache = ParameterCache::new(Arc::new(driver_expecting(1)));

        let first = cache.resolve_default("db", "get_total").await.unwrap();
        let second = cache.resolve_default("db", "get_total").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "customer_id");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_return_value_flag_is_part_of_key() {
        let cache = ParameterCache::new(Arc::new(driver_expecting(2)));

        let without = cache.resolve("db", "get_total", false).await.unwrap();
        let with = cache.resolve("db", "get_total", true).await.unwrap();

        assert_eq!(without.len(), 2);
        assert_eq!(with.len(), 3);
        assert_eq!(with[0].direction, ParameterDirection::ReturnValue);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_clone_mutation_does_not_touch_template() {
        let cache = ParameterCache::new(Arc::new(driver_expecting(1)));

        let mut first = cache.resolve_default("db", "get_total").await.unwrap();
        first[0].value = Some(SqlValue::Int(42));
        first.push(SqlParameter::new("extra", 1));

        let second = cache.resolve_default("db", "get_total").await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].value, None);
    }

    #[tokio::test]
    async fn test_failed_discovery_is_not_cached() {
        let mut driver = MockSqlDriver::new();
        driver.expect_open().times(2).returning(|_| {
            let mut connection = MockSqlConnection::new();
            connection
                .expect_derive_parameters()
                .returning(|name| Err(AppError::ProcedureNotFound(name.to_string())));
            connection.expect_close().times(1).returning(|| Ok(()));
            Ok(Box::new(connection) as Box<dyn SqlConnection>)
        });
        let cache = ParameterCache::new(Arc::new(driver));

        for _ in 0..2 {
            let result = cache.resolve_default("db", "missing").await;
            assert!(matches!(result, Err(AppError::ProcedureNotFound(_))));
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_close_failure_keeps_discovery_result() {
        let mut driver = MockSqlDriver::new();
        driver.expect_open().times(2).returning(|target| {
            let missing = target == "missing";
            let mut connection = MockSqlConnection::new();
            connection.expect_derive_parameters().returning(move |name| {
                if missing {
                    Err(AppError::ProcedureNotFound(name.to_string()))
                } else {
                    Ok(signature())
                }
            });
            connection
                .expect_close()
                .times(1)
                .returning(|| Err(AppError::internal("socket already closed")));
            Ok(Box::new(connection) as Box<dyn SqlConnection>)
        });
        let cache = ParameterCache::new(Arc::new(driver));

        let found = cache.resolve_default("db", "get_total").await.unwrap();
        assert_eq!(found, signature()[1..].to_vec());

        let missing = cache.resolve_default("missing", "missing").await;
        assert!(matches!(missing, Err(AppError::ProcedureNotFound(_))));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_share_intact_templates() {
        let mut driver = MockSqlDriver::new();
        driver.expect_open().returning(|_| {
            let mut connection = MockSqlConnection::new();
            connection
                .expect_derive_parameters()
                .returning(|_| Ok(signature()));
            connection.expect_close().returning(|| Ok(()));
            Ok(Box::new(connection) as Box<dyn SqlConnection>)
        });
        let cache = Arc::new(ParameterCache::new(Arc::new(driver)));

        let mut handles = Vec::new();
        for i in 0..16 {
            let shared = cache.clone();
            handles.push(tokio::spawn(async move {
                shared.resolve_default("db", "get_total").await
            }));
            let distinct = cache.clone();
            handles.push(tokio::spawn(async move {
                distinct.resolve_default("db", &format!("proc_{}", i)).await
            }));
        }

        let expected = signature()[1..].to_vec();
        for handle in handles {
            let mut parameters = handle.await.unwrap().unwrap();
            assert_eq!(parameters, expected);
            parameters[0].value = Some(SqlValue::Int(7));
        }

        assert_eq!(cache.len(), 17);
        let again = cache.resolve_default("db", "get_total").await.unwrap();
        assert_eq!(again, expected);
        assert_eq!(again[0].value, None);
    }

    #[tokio::test]
    async fn test_seeded_entries_skip_discovery() {
        let mut driver = MockSqlDriver::new();
        driver.expect_open().never();
        let cache = ParameterCache::new(Arc::new(driver));

        assert!(cache.get_cached_parameter_set("db", "manual").is_none());
        cache.cache_parameter_set("db", "manual", vec![SqlParameter::new("a", 1)]);

        let seeded = cache.get_cached_parameter_set("db", "manual").unwrap();
        assert_eq!(seeded[0].name, "a");
        let resolved = cache.resolve_default("db", "manual").await.unwrap();
        assert_eq!(resolved, seeded);
    }

    #[test]
    fn test_key_display_hides_target() {
        let key = CacheKey::new("postgres://user:secret@db/app", "proc", true);
        let shown = key.to_string();
        assert!(!shown.contains("secret"));
        assert!(shown.ends_with(RETURN_VALUE_KEY_SUFFIX));
    }
}
