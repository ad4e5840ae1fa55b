//! Destructive schema administration.
//!
//! Drops every table of the `public` schema in one transaction with
//! foreign-key triggers suspended for that transaction only.

use crate::error::IvoryError;
use crate::services::connection::SqlSession;
use crate::services::query::QueryService;

pub(crate) const BEGIN_SQL: &str = "BEGIN";
pub(crate) const COMMIT_SQL: &str = "COMMIT";
pub(crate) const ROLLBACK_SQL: &str = "ROLLBACK";

/// Suspends foreign-key enforcement (and all other triggers) until the
/// transaction ends, however it ends.
pub(crate) const DISABLE_TRIGGERS_SQL: &str = "SET LOCAL session_replication_role = replica";

/// Schema administration service.
pub struct SchemaService;

impl SchemaService {
    /// Drop every table in the `public` schema, all or nothing.
    ///
    /// Any failure rolls the transaction back, leaving every table in place.
    /// Enforcement is restored by the end of the transaction either way. The
    /// first error is returned in preference to a failed rollback.
    pub async fn delete_all_tables(session: &dyn SqlSession) -> Result<(), IvoryError> {
        session.execute_text(BEGIN_SQL).await?;

        let count = match Self::drop_public_tables(session).await {
            Ok(count) => count,
            Err(e) => {
                if let Err(rollback) = session.execute_text(ROLLBACK_SQL).await {
                    tracing::error!(error = %rollback, "Failed to roll back table drops");
                }
                return Err(e);
            }
        };

        session.execute_text(COMMIT_SQL).await?;

        tracing::info!(tables = count, "Dropped all tables");
        Ok(())
    }

    async fn drop_public_tables(session: &dyn SqlSession) -> Result<usize, IvoryError> {
        session.execute_text(DISABLE_TRIGGERS_SQL).await?;

        let tables = QueryService::list_tables(session).await?;

        for table in &tables {
            session.execute_text(&drop_table_sql(table)).await.map_err(|e| {
                tracing::warn!(table = %table, error = %e, "Failed to drop table");
                e.context(format!("drop table {table}"))
            })?;
        }

        Ok(tables.len())
    }
}

/// Build the drop statement for a table of the `public` schema.
fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS public.{} CASCADE", quote_ident(table))
}

/// Quote an identifier so mixed-case and reserved names survive.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
