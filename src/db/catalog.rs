//! Schema and function metadata
//!
//! Both services resolve a profile, open a session through a [`Connector`]
//! and read `information_schema`. They never fail: connection or query
//! errors are logged and reported as an empty list.

use crate::config::ConnectionConfig;
use crate::db::types::{ParamValue, Row};
use crate::db::{Connector, Database};
use crate::error::DbResult;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Schemas that never show up in listings
pub const EXCLUDED_SCHEMAS: [&str; 3] = ["information_schema", "pg_catalog", "pg_toast"];

const SCHEMAS_SQL: &str = "SELECT schema_name::text \
     FROM information_schema.schemata \
     WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast') \
     ORDER BY schema_name";

const FUNCTIONS_SQL: &str = "SELECT r.routine_name::text, r.data_type::text, r.specific_name::text, \
            (SELECT count(*) FROM information_schema.parameters p \
              WHERE p.specific_schema = r.specific_schema \
                AND p.specific_name = r.specific_name \
                AND p.parameter_mode IN ('IN', 'INOUT')) AS input_arity \
     FROM information_schema.routines r \
     WHERE r.routine_schema = $1::text AND r.routine_type = 'FUNCTION' \
     ORDER BY r.routine_name, r.specific_name";

const PARAMETERS_SQL: &str = "SELECT parameter_name::text, data_type::text, \
            parameter_mode::text, ordinal_position::int4 \
     FROM information_schema.parameters \
     WHERE specific_schema = $1::text AND specific_name = $2::text \
     ORDER BY ordinal_position";

/// A function listed in a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionDescriptor {
    pub name: String,
    /// Declared return type; `void` when the catalog reports none
    pub return_type: String,
    /// Overload-unique catalog name, used to look up parameters
    pub specific_name: String,
    /// Number of IN/INOUT parameters
    pub input_arity: usize,
}

/// Direction of a function parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterMode {
    In,
    InOut,
}

impl ParameterMode {
    fn parse(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(ParameterMode::In),
            "INOUT" => Some(ParameterMode::InOut),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterMode::In => write!(f, "IN"),
            ParameterMode::InOut => write!(f, "INOUT"),
        }
    }
}

/// An input parameter of a specific function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterDescriptor {
    /// Declared name, or `param_<position>` when unnamed
    pub name: String,
    pub data_type: String,
    pub mode: ParameterMode,
    /// 1-based ordinal position
    pub position: u32,
}

/// Lists non-system schemas
pub struct SchemaService<C> {
    connector: Arc<C>,
}

impl<C: Connector> SchemaService<C> {
    pub fn new(connector: Arc<C>) -> Self {
        Self { connector }
    }

    /// Non-system schema names, ascending; empty on any failure
    pub async fn list_schemas(&self, profile: &ConnectionConfig) -> Vec<String> {
        let result = match self.connector.connect(profile).await {
            Ok(db) => fetch_schemas(&db).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(schemas) => {
                tracing::debug!("Found {} schema(s) on \"{}\"", schemas.len(), profile.name);
                schemas
            }
            Err(e) => {
                tracing::error!("Failed to list schemas on \"{}\": {}", profile.name, e);
                Vec::new()
            }
        }
    }
}

/// Lists functions and their input parameters
pub struct FunctionService<C> {
    connector: Arc<C>,
}

impl<C: Connector> FunctionService<C> {
    pub fn new(connector: Arc<C>) -> Self {
        Self { connector }
    }

    /// Every function in `schema` ordered by name; empty on any failure
    pub async fn list_functions(
        &self,
        profile: &ConnectionConfig,
        schema: &str,
    ) -> Vec<FunctionDescriptor> {
        let result = match self.connector.connect(profile).await {
            Ok(db) => fetch_functions(&db, schema).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(functions) => functions,
            Err(e) => {
                tracing::error!(
                    "Failed to list functions of '{}' on \"{}\": {}",
                    schema,
                    profile.name,
                    e
                );
                Vec::new()
            }
        }
    }

    /// Functions in `schema` that take no input arguments
    pub async fn list_zero_arg_functions(
        &self,
        profile: &ConnectionConfig,
        schema: &str,
    ) -> Vec<FunctionDescriptor> {
        let mut functions = self.list_functions(profile, schema).await;
        functions.retain(|f| f.input_arity == 0);
        functions
    }

    /// IN/INOUT parameters of one function, by ordinal position
    pub async fn list_parameters(
        &self,
        profile: &ConnectionConfig,
        schema: &str,
        specific_name: &str,
    ) -> Vec<ParameterDescriptor> {
        let result = match self.connector.connect(profile).await {
            Ok(db) => fetch_parameters(&db, schema, specific_name).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(parameters) => parameters,
            Err(e) => {
                tracing::error!(
                    "Failed to list parameters of {}.{} on \"{}\": {}",
                    schema,
                    specific_name,
                    profile.name,
                    e
                );
                Vec::new()
            }
        }
    }
}

/// Read non-system schema names over an open session
pub async fn fetch_schemas<D: Database>(db: &D) -> DbResult<Vec<String>> {
    let results = db.query(SCHEMAS_SQL, &[]).await?;
    let mut schemas: Vec<String> = results
        .rows
        .iter()
        .filter_map(|row| row.text(0))
        .filter(|name| !EXCLUDED_SCHEMAS.contains(name))
        .map(str::to_string)
        .collect();
    schemas.sort();
    Ok(schemas)
}

/// Read every function of `schema` over an open session
pub async fn fetch_functions<D: Database>(db: &D, schema: &str) -> DbResult<Vec<FunctionDescriptor>> {
    let results = db
        .query(FUNCTIONS_SQL, &[ParamValue::from(schema)])
        .await?;
    Ok(results.rows.iter().filter_map(function_from_row).collect())
}

/// Read the IN/INOUT parameters of one function over an open session
pub async fn fetch_parameters<D: Database>(
    db: &D,
    schema: &str,
    specific_name: &str,
) -> DbResult<Vec<ParameterDescriptor>> {
    let results = db
        .query(
            PARAMETERS_SQL,
            &[ParamValue::from(schema), ParamValue::from(specific_name)],
        )
        .await?;
    let mut parameters: Vec<ParameterDescriptor> =
        results.rows.iter().filter_map(parameter_from_row).collect();
    parameters.sort_by_key(|p| p.position);
    Ok(parameters)
}

fn function_from_row(row: &Row) -> Option<FunctionDescriptor> {
    let name = row.text(0)?.to_string();
    let return_type = row
        .text(1)
        .filter(|t| !t.is_empty())
        .unwrap_or("void")
        .to_string();
    let specific_name = row.text(2).unwrap_or(&name).to_string();
    let input_arity = row
        .integer(3)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    Some(FunctionDescriptor {
        name,
        return_type,
        specific_name,
        input_arity,
    })
}

fn parameter_from_row(row: &Row) -> Option<ParameterDescriptor> {
    let mode = ParameterMode::parse(row.text(2)?)?;
    let position = row.integer(3).and_then(|n| u32::try_from(n).ok())?;
    let name = match row.text(0) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("param_{}", position),
    };
    Some(ParameterDescriptor {
        name,
        data_type: row.text(1).unwrap_or("unknown").to_string(),
        mode,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::CellValue;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_function_row_defaults() {
        let row = Row::new(vec![text("f0"), CellValue::Null, CellValue::Null, CellValue::Integer(0)]);
        let f = function_from_row(&row).unwrap();
        assert_eq!(f.name, "f0");
        assert_eq!(f.return_type, "void");
        assert_eq!(f.specific_name, "f0");
        assert_eq!(f.input_arity, 0);
    }

    #[test]
    fn test_function_row_without_name_is_skipped() {
        let row = Row::new(vec![CellValue::Null, text("int4"), text("x_1"), CellValue::Integer(1)]);
        assert!(function_from_row(&row).is_none());
    }

    #[test]
    fn test_parameter_row_filters_out_mode() {
        let out = Row::new(vec![text("r"), text("integer"), text("OUT"), CellValue::Integer(2)]);
        assert!(parameter_from_row(&out).is_none());

        let inout = Row::new(vec![text("x"), text("text"), text("INOUT"), CellValue::Integer(1)]);
        assert_eq!(parameter_from_row(&inout).unwrap().mode, ParameterMode::InOut);
    }

    #[test]
    fn test_unnamed_parameter_gets_positional_name() {
        let row = Row::new(vec![CellValue::Null, text("integer"), text("IN"), CellValue::Integer(3)]);
        let p = parameter_from_row(&row).unwrap();
        assert_eq!(p.name, "param_3");
        assert_eq!(p.position, 3);
    }

    #[test]
    fn test_parameter_mode_display() {
        assert_eq!(ParameterMode::In.to_string(), "IN");
        assert_eq!(ParameterMode::InOut.to_string(), "INOUT");
        assert_eq!(ParameterMode::parse("inout"), Some(ParameterMode::InOut));
        assert_eq!(ParameterMode::parse("VARIADIC"), None);
    }
}
