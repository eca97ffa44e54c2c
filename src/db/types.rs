//! Database type definitions
//!
//! Materialized query results, cell values, and the dynamically typed
//! [`ParamValue`] used for bound parameters.

use bytes::BytesMut;
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};

/// Query execution results, fully drained from the server
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults {
    /// Column definitions
    pub columns: Vec<ColumnDef>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Query execution time
    pub execution_time: Duration,
    /// Total row count
    pub row_count: usize,
}

/// Column definition in query results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// PostgreSQL type name (e.g. "int4", "geometry")
    pub type_name: String,
}

/// A single row of query results
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Cell values in column order
    pub values: Vec<CellValue>,
}

/// A cell value (single column value in a row)
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    /// JSON value (parsed)
    Json(serde_json::Value),
    Binary(Vec<u8>),
    /// Date/time value rendered as text
    DateTime(String),
    Uuid(String),
    Array(Vec<CellValue>),
}

impl QueryResults {
    pub fn new(
        columns: Vec<ColumnDef>,
        rows: Vec<Row>,
        execution_time: Duration,
        row_count: usize,
    ) -> Self {
        Self {
            columns,
            rows,
            execution_time,
            row_count,
        }
    }

    /// The first cell of the first row, if any
    pub fn scalar(&self) -> Option<&CellValue> {
        self.rows.first().and_then(|row| row.values.first())
    }
}

impl Row {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }

    /// Text value at `idx`; `None` for NULL, missing or non-text cells
    pub fn text(&self, idx: usize) -> Option<&str> {
        match self.values.get(idx) {
            Some(CellValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer value at `idx`, parsing text cells when needed
    pub fn integer(&self, idx: usize) -> Option<i64> {
        match self.values.get(idx) {
            Some(CellValue::Integer(n)) => Some(*n),
            Some(CellValue::Text(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Uuid(s) => {
                write!(f, "{}", s)
            }
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::Json(v) => write!(f, "{}", v),
            CellValue::Binary(b) => write!(f, "<binary {} bytes>", b.len()),
            CellValue::Array(arr) => {
                let items: Vec<String> = arr.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", items.join(","))
            }
        }
    }
}

/// A parameter value bound to a `$n` placeholder.
///
/// The wire encoding follows the type the server inferred for the
/// placeholder, so `Text("42")` binds to an `int4` argument and
/// `Integer(1)` binds to a `numeric` one.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Interpret a command-line argument: `NULL` is null, everything else text
    pub fn from_arg(arg: &str) -> Self {
        if arg.eq_ignore_ascii_case("null") {
            ParamValue::Null
        } else {
            ParamValue::Text(arg.to_string())
        }
    }

    /// Render as an inline SQL literal; strings are single-quoted with
    /// embedded quotes doubled, everything else is stringified.
    pub fn to_sql_literal(&self) -> String {
        match self {
            ParamValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            other => other.plain_text(),
        }
    }

    fn plain_text(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Integer(n) => n.to_string(),
            ParamValue::Float(v) => v.to_string(),
            ParamValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

type BindResult = Result<IsNull, Box<dyn Error + Sync + Send>>;

impl ToSql for ParamValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> BindResult {
        if let Kind::Domain(base) = ty.kind() {
            return self.to_sql(base, out);
        }
        match self {
            ParamValue::Null => Ok(IsNull::Yes),
            ParamValue::Bool(b) if *ty == Type::BOOL => b.to_sql(ty, out),
            ParamValue::Integer(n) => bind_integer(*n, ty, out),
            ParamValue::Float(v) => bind_float(*v, ty, out),
            ParamValue::Text(s) => bind_text(s, ty, out),
            other => bind_text(&other.plain_text(), ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind_integer(n: i64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => n.to_sql(ty, out),
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => (n as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(n).to_sql(ty, out),
        _ => bind_text(&n.to_string(), ty, out),
    }
}

fn bind_float(v: f64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        _ => bind_text(&v.to_string(), ty, out),
    }
}

fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> BindResult {
    if <&str as ToSql>::accepts(ty) {
        return s.to_sql(ty, out);
    }
    let s = s.trim();
    match *ty {
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::INT2 => s.parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_str(s)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
            .unwrap_or_else(|_| serde_json::Value::String(s.to_string()))
            .to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::DATE => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIMESTAMP => chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?
            .to_sql(ty, out),
        Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(s)?
            .with_timezone(&chrono::Utc)
            .to_sql(ty, out),
        _ => Err(format!("cannot bind '{}' to parameter of type {}", s, ty.name()).into()),
    }
}

fn parse_bool(s: &str) -> Result<bool, Box<dyn Error + Sync + Send>> {
    match s.to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("invalid boolean '{}'", s).into()),
    }
}
