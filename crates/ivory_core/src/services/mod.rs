//! Backend services for the Ivory administration service.
//!
//! This module contains all service layer abstractions:
//! - `connection` - Database connection pooling with deadpool-postgres
//! - `query` - Table listing and query execution with result normalization
//! - `schema` - Dropping every table of the default schema
//! - `backup` - Dump, restore and backup file management via client tools
//! - `admin` - Facade composing the above for the HTTP layer

pub mod admin;
pub mod backup;
pub mod connection;
pub mod query;
pub mod schema;

pub use admin::AdminService;
pub use backup::{BackupService, BackupTools};
pub use connection::{ConnectionPool, PooledConnection, SqlSession};
pub use query::QueryService;
pub use schema::SchemaService;
