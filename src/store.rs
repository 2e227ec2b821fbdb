//! Document store client.
//!
//! Read/write access to the ERP's relational database for everything the
//! automation API does not expose: correlation-key lookups after a
//! document add, catalog reads, and the raw link updates. Rows come back
//! as ordered column/value mappings with vendor-facing normalization:
//! timestamps render as `%Y-%m-%d %H:%M:%S` strings, SQL decimals as their
//! exact string representation, NULLs as empty strings. Storefront
//! consumers depend on those exact formats.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo};

use crate::error::Result;

/// A bind parameter for a store query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Text(String),
    Int(i64),
    Dec(Decimal),
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Int(v)
    }
}

impl From<Decimal> for SqlArg {
    fn from(v: Decimal) -> Self {
        SqlArg::Dec(v)
    }
}

/// One result row: column name to normalized value, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreRow(pub Vec<(String, Value)>);

impl StoreRow {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Integer column, tolerating the string normalization of numerics.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_decimal(&self, name: &str) -> Option<Decimal> {
        match self.get(name)? {
            Value::Number(n) => n.to_string().parse().ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl Serialize for StoreRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (col, value) in &self.0 {
            map.serialize_entry(col, value)?;
        }
        map.end()
    }
}

/// Read/write port onto the ERP database. One handle per request context.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Runs a parameterized select. An empty result is an empty vec, never
    /// an error.
    async fn fetch_all(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<StoreRow>>;

    /// Runs a raw write (link records, post-add fix-ups). Returns affected
    /// row count.
    async fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<u64>;

    async fn fetch_one(&self, sql: &str, args: &[SqlArg]) -> Result<Option<StoreRow>> {
        Ok(self.fetch_all(sql, args).await?.into_iter().next())
    }
}

/// sqlx-backed production store.
pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqlStore {
    async fn fetch_all(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<StoreRow>> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                SqlArg::Text(v) => query.bind(v.clone()),
                SqlArg::Int(v) => query.bind(*v),
                SqlArg::Dec(v) => query.bind(*v),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(normalize_row).collect())
    }

    async fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                SqlArg::Text(v) => query.bind(v.clone()),
                SqlArg::Int(v) => query.bind(*v),
                SqlArg::Dec(v) => query.bind(*v),
            };
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}

fn normalize_row(row: &PgRow) -> StoreRow {
    let mut columns = Vec::with_capacity(row.len());
    for col in row.columns() {
        let idx = col.ordinal();
        let value = match col.type_info().name() {
            "NUMERIC" => row
                .try_get::<Option<Decimal>, _>(idx)
                .ok()
                .flatten()
                .map(decimal_value),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(idx)
                .ok()
                .flatten()
                .map(timestamp_value),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .ok()
                .flatten()
                .map(|ts| timestamp_value(ts.naive_utc())),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .ok()
                .flatten()
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v as i64)),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v as i64)),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::from(v as f64)),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(Value::String),
        };
        // NULL renders as an empty string, matching what the storefront
        // integration has always received.
        columns.push((
            col.name().to_string(),
            value.unwrap_or_else(|| Value::String(String::new())),
        ));
    }
    StoreRow(columns)
}

/// Exact string representation; decimals never pass through a float.
fn decimal_value(d: Decimal) -> Value {
    Value::String(d.to_string())
}

fn timestamp_value(ts: NaiveDateTime) -> Value {
    Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_normalizes_to_exact_string() {
        let d: Decimal = "1234.5600".parse().unwrap();
        assert_eq!(decimal_value(d), Value::String("1234.5600".into()));
    }

    #[test]
    fn timestamp_normalizes_to_fixed_format() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(16, 5, 9)
            .unwrap();
        assert_eq!(timestamp_value(ts), Value::String("2024-03-07 16:05:09".into()));
    }

    #[test]
    fn row_lookup_is_case_insensitive_and_ordered() {
        let row = StoreRow(vec![
            ("DocEntry".into(), Value::from(42)),
            ("DocNum".into(), Value::from(1042)),
            ("DocTotal".into(), Value::String("20.00".into())),
        ]);
        assert_eq!(row.get_i64("docentry"), Some(42));
        assert_eq!(row.get_decimal("DOCTOTAL"), Some("20.00".parse().unwrap()));
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.starts_with("{\"DocEntry\""));
    }
}
