//! Query execution models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::IvoryError;

/// A result row: column name to normalized JSON value.
pub type Row = Map<String, Value>;

/// Whether a statement is expected to return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Returns rows; executed and normalized into JSON objects.
    Read,
    /// Everything else; reported as an affected-row count.
    Write,
}

impl QueryKind {
    /// Classify a statement by its first six characters.
    ///
    /// Only a case-insensitive `SELECT` prefix is a read. Leading whitespace
    /// and `WITH ... SELECT` are writes. Strings shorter than six bytes, or
    /// whose sixth byte splits a character, are writes.
    pub fn classify(sql: &str) -> Self {
        match sql.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case("SELECT") => Self::Read,
            _ => Self::Write,
        }
    }
}

/// How a text-encoded value is turned into JSON, decided by the column's
/// declared database type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// numeric, decimal, real, double precision
    Float,
    /// smallint, integer, bigint
    Integer,
    /// boolean (`t` / `f`)
    Boolean,
    /// json, jsonb
    Json,
    /// Anything else, passed through as a string
    Text,
}

impl ColumnKind {
    /// Map a PostgreSQL type name to a column kind.
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name.to_ascii_lowercase().as_str() {
            "numeric" | "decimal" | "float" | "float4" | "float8" | "real"
            | "double precision" => Self::Float,
            "int" | "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" => Self::Integer,
            "bool" | "boolean" => Self::Boolean,
            "json" | "jsonb" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Normalize one text-encoded cell.
    ///
    /// NULL becomes `null`; values that fail to parse for their kind fall
    /// back to the raw string.
    pub fn normalize(self, raw: Option<&str>) -> Value {
        let Some(raw) = raw else {
            return Value::Null;
        };

        let parsed = match self {
            Self::Float => raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number),
            Self::Integer => raw.parse::<i64>().ok().map(|v| Value::Number(v.into())),
            Self::Boolean => match raw {
                "t" | "true" => Some(Value::Bool(true)),
                "f" | "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Self::Json => serde_json::from_str(raw).ok(),
            Self::Text => None,
        };

        parsed.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

/// Column metadata from a described statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// PostgreSQL type OID
    pub type_oid: u32,
    /// Human-readable type name
    pub type_name: String,
}

impl ColumnInfo {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, type_oid: u32, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_oid, type_name: type_name.into() }
    }

    /// How this column's values are normalized.
    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_type_name(&self.type_name)
    }
}

/// One row as returned over the text protocol, in column order.
pub type TextRow = Vec<Option<String>>;

/// Outcome of executing a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Normalized rows of a read.
    Rows(Vec<Row>),
    /// Driver-reported affected-row count of a write.
    Affected(u64),
}

impl QueryOutcome {
    /// Build normalized rows from column metadata and text-encoded values.
    pub fn from_text_rows(columns: &[ColumnInfo], rows: Vec<TextRow>) -> Self {
        let kinds: Vec<ColumnKind> = columns.iter().map(ColumnInfo::kind).collect();

        let rows = rows
            .into_iter()
            .map(|values| {
                columns
                    .iter()
                    .zip(&kinds)
                    .zip(values)
                    .map(|((column, kind), value)| {
                        (column.name.clone(), kind.normalize(value.as_deref()))
                    })
                    .collect()
            })
            .collect();

        Self::Rows(rows)
    }

    /// Render as the string returned to callers: a JSON array for reads,
    /// `rows affected: N` for writes.
    pub fn render(&self) -> Result<String, IvoryError> {
        match self {
            Self::Rows(rows) => Ok(serde_json::to_string(rows)?),
            Self::Affected(count) => Ok(format!("rows affected: {count}")),
        }
    }
}
