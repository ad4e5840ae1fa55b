//! Query execution and result normalization.
//!
//! Statements are passed to the server verbatim. Reads are described first
//! to learn each column's declared type, then run over the text protocol so
//! every value can be normalized into JSON by that type.

use crate::error::IvoryError;
use crate::models::{QueryKind, QueryOutcome};
use crate::services::connection::SqlSession;

use std::time::Instant;

/// Catalog query for the base tables of the default schema.
pub(crate) const LIST_TABLES_SQL: &str = "SELECT table_name \
     FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

/// Service for listing tables and executing arbitrary SQL.
pub struct QueryService;

impl QueryService {
    /// List all base tables in the `public` schema.
    pub async fn list_tables(session: &dyn SqlSession) -> Result<Vec<String>, IvoryError> {
        let rows = session.query_text(LIST_TABLES_SQL).await?;
        Ok(rows.into_iter().filter_map(|row| row.into_iter().next().flatten()).collect())
    }

    /// Execute `sql` and normalize its result.
    ///
    /// Reads yield JSON rows; writes yield the affected-row count.
    pub async fn execute(session: &dyn SqlSession, sql: &str) -> Result<QueryOutcome, IvoryError> {
        let start = Instant::now();
        let kind = QueryKind::classify(sql);

        tracing::debug!(query_kind = ?kind, "Executing query");

        let outcome = match kind {
            QueryKind::Read => {
                let columns = session.describe(sql).await?;
                let rows = session.query_text(sql).await?;
                QueryOutcome::from_text_rows(&columns, rows)
            }
            QueryKind::Write => QueryOutcome::Affected(session.execute_text(sql).await?),
        };

        tracing::debug!(
            query_kind = ?kind,
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );

        Ok(outcome)
    }

    /// Execute `sql` and render the result string returned to callers.
    pub async fn execute_to_string(
        session: &dyn SqlSession,
        sql: &str,
    ) -> Result<String, IvoryError> {
        Self::execute(session, sql).await?.render()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ColumnInfo, TextRow};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Session double that answers from canned results and records every
    /// statement it receives.
    #[derive(Default)]
    pub(crate) struct FakeSession {
        pub columns: HashMap<String, Vec<ColumnInfo>>,
        pub rows: HashMap<String, Vec<TextRow>>,
        pub affected: HashMap<String, u64>,
        /// Statements containing this text fail with a query error.
        pub fail_on: Option<String>,
        pub log: Mutex<Vec<String>>,
    }

    impl FakeSession {
        pub fn statements(&self) -> Vec<String> {
            self.log.lock().clone()
        }

        fn record(&self, sql: &str) -> Result<(), IvoryError> {
            self.log.lock().push(sql.to_string());
            match &self.fail_on {
                Some(needle) if sql.contains(needle.as_str()) => {
                    Err(IvoryError::query(format!("could not execute: {sql}")))
                }
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl SqlSession for FakeSession {
        async fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>, IvoryError> {
            Ok(self.columns.get(sql).cloned().unwrap_or_default())
        }

        async fn query_text(&self, sql: &str) -> Result<Vec<TextRow>, IvoryError> {
            self.record(sql)?;
            Ok(self.rows.get(sql).cloned().unwrap_or_default())
        }

        async fn execute_text(&self, sql: &str) -> Result<u64, IvoryError> {
            self.record(sql)?;
            Ok(self.affected.get(sql).copied().unwrap_or(0))
        }
    }

    #[tokio::test]
    async fn test_select_one_returns_integer() {
        let mut session = FakeSession::default();
        session.columns.insert("SELECT 1 AS x".into(), vec![ColumnInfo::new("x", 23, "int4")]);
        session.rows.insert("SELECT 1 AS x".into(), vec![vec![Some("1".into())]]);

        let result = QueryService::execute_to_string(&session, "SELECT 1 AS x").await.unwrap();
        assert_eq!(result, r#"[{"x":1}]"#);
    }

    #[tokio::test]
    async fn test_delete_reports_rows_affected() {
        let session = FakeSession::default();

        let result =
            QueryService::execute_to_string(&session, "DELETE FROM t WHERE 1=0").await.unwrap();
        assert_eq!(result, "rows affected: 0");
        assert_eq!(session.statements(), vec!["DELETE FROM t WHERE 1=0".to_string()]);
    }

    #[tokio::test]
    async fn test_write_reports_driver_count() {
        let mut session = FakeSession::default();
        session.affected.insert("UPDATE t SET a = 1".into(), 7);

        let outcome = QueryService::execute(&session, "UPDATE t SET a = 1").await.unwrap();
        assert_eq!(outcome, QueryOutcome::Affected(7));
    }

    #[tokio::test]
    async fn test_read_normalizes_by_declared_type() {
        let sql = "select price, qty, sku from items";
        let mut session = FakeSession::default();
        session.columns.insert(
            sql.into(),
            vec![
                ColumnInfo::new("price", 1700, "numeric"),
                ColumnInfo::new("qty", 20, "int8"),
                ColumnInfo::new("sku", 25, "text"),
            ],
        );
        session.rows.insert(
            sql.into(),
            vec![vec![Some("3.14".into()), Some("42".into()), Some("42".into())]],
        );

        let rendered = QueryService::execute_to_string(&session, sql).await.unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value, json!([{"price": 3.14, "qty": 42, "sku": "42"}]));
    }

    #[tokio::test]
    async fn test_leading_whitespace_select_runs_as_write() {
        let session = FakeSession::default();

        let result = QueryService::execute_to_string(&session, "  SELECT 1").await.unwrap();
        assert_eq!(result, "rows affected: 0");
    }

    #[tokio::test]
    async fn test_query_errors_propagate() {
        let session = FakeSession { fail_on: Some("DROP".into()), ..FakeSession::default() };

        let err = QueryService::execute(&session, "DROP TABLE missing").await.unwrap_err();
        assert_eq!(err.category(), "Query");
    }

    #[tokio::test]
    async fn test_list_tables_reads_first_column() {
        let mut session = FakeSession::default();
        session.rows.insert(
            LIST_TABLES_SQL.into(),
            vec![vec![Some("orders".into())], vec![Some("users".into())]],
        );

        let tables = QueryService::list_tables(&session).await.unwrap();
        assert_eq!(tables, vec!["orders".to_string(), "users".to_string()]);
    }
}
