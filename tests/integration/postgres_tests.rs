//! Integration tests for the PostgreSQL connector, metadata services and
//! function execution

use pgfunc::config::{ConnectionConfig, SslMode};
use pgfunc::db::{
    CellValue, Connector, Database, FunctionService, ParamValue, ParameterMode,
    PostgresClient, PostgresConnector, SchemaService,
};
use pgfunc::error::DbError;
use pgfunc::task::{FunctionExecutionTask, NoopListener, TaskState};
use pgfunc::tester::{ConnectionTester, ConnectorTester};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const SCHEMA: &str = "pgfunc_it";

static FIXTURES: OnceCell<()> = OnceCell::const_new();

/// Get test database connection config
fn test_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::new(
        "integration-test",
        std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        std::env::var("TEST_DB_USER").unwrap_or_else(|_| "test_user".to_string()),
    );
    config.port = std::env::var("TEST_DB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5433);
    config.database = Some(std::env::var("TEST_DB_NAME").unwrap_or_else(|_| "test_db".to_string()));
    config.password = Some(
        std::env::var("TEST_DB_PASSWORD").unwrap_or_else(|_| "test_password".to_string()),
    );
    config.ssl_mode = SslMode::Disable;
    config
}

fn connector() -> Arc<PostgresConnector> {
    Arc::new(PostgresConnector::new(Duration::from_secs(5)))
}

/// Connect and install the test functions once per run; `None` skips
async fn setup() -> Option<PostgresClient> {
    let config = test_config();
    let client = match connector().connect(&config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!(
                "Skipping test: Database not available at {}:{} - {}",
                config.host, config.port, e
            );
            return None;
        }
    };
    FIXTURES
        .get_or_init(|| async {
            for sql in [
                "CREATE SCHEMA IF NOT EXISTS pgfunc_it",
                "CREATE OR REPLACE FUNCTION pgfunc_it.answer() RETURNS integer \
                 LANGUAGE sql AS 'SELECT 42'",
                "CREATE OR REPLACE FUNCTION pgfunc_it.plus_one(x integer) RETURNS integer \
                 LANGUAGE sql AS 'SELECT x + 1'",
                "CREATE OR REPLACE FUNCTION pgfunc_it.greet(who text, INOUT n integer, OUT msg text) \
                 LANGUAGE sql AS $$SELECT n, 'hi ' || who$$",
                "CREATE OR REPLACE FUNCTION pgfunc_it.touch() RETURNS void \
                 LANGUAGE plpgsql AS $$BEGIN NULL; END$$",
                "CREATE OR REPLACE FUNCTION pgfunc_it.slow() RETURNS integer \
                 LANGUAGE sql AS 'SELECT 1 FROM pg_sleep(30)'",
                "CREATE OR REPLACE FUNCTION pgfunc_it.pairs() RETURNS TABLE(id integer, label text) \
                 LANGUAGE sql AS $$VALUES (1, 'a'), (2, 'b')$$",
                "CREATE OR REPLACE FUNCTION pgfunc_it.pt() RETURNS point \
                 LANGUAGE sql AS 'SELECT point(1, 2)'",
            ] {
                client
                    .query(sql, &[])
                    .await
                    .unwrap_or_else(|e| panic!("fixture failed: {}: {}", sql, e));
            }
        })
        .await;
    Some(client)
}

fn task(function: &str, params: Vec<ParamValue>) -> FunctionExecutionTask<PostgresConnector> {
    FunctionExecutionTask::new(connector(), test_config(), SCHEMA, function, params)
}

#[tokio::test]
async fn test_execute_simple_query() {
    let Some(client) = setup().await else { return };

    let results = client
        .query("SELECT 1 as num, 'hello' as msg, NULL::text as nothing, true as ok", &[])
        .await
        .expect("Query should succeed");
    assert_eq!(results.columns.len(), 4);
    assert_eq!(results.columns[0].name, "num");
    assert_eq!(results.row_count, 1);

    let row = &results.rows[0];
    assert_eq!(row.values[0], CellValue::Integer(1));
    assert_eq!(row.values[1], CellValue::Text("hello".into()));
    assert_eq!(row.values[2], CellValue::Null);
    assert_eq!(row.values[3], CellValue::Boolean(true));
}

#[tokio::test]
async fn test_text_parameters_adapt_to_server_types() {
    let Some(client) = setup().await else { return };

    let results = client
        .query(
            "SELECT $1::int4 + 1, $2::numeric * 2, $3::bool, $4::date",
            &[
                ParamValue::from_arg("41"),
                ParamValue::from_arg("1.25"),
                ParamValue::from_arg("true"),
                ParamValue::from_arg("2024-02-29"),
            ],
        )
        .await
        .expect("Query should succeed");
    let row = &results.rows[0];
    assert_eq!(row.values[0], CellValue::Integer(42));
    assert_eq!(row.values[1].to_string(), "2.50");
    assert_eq!(row.values[2], CellValue::Boolean(true));
}

#[tokio::test]
async fn test_unparseable_parameter_is_an_error() {
    let Some(client) = setup().await else { return };

    let err = client
        .query("SELECT $1::int4", &[ParamValue::from_arg("forty-two")])
        .await
        .unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn test_invalid_query() {
    let Some(client) = setup().await else { return };

    let err = client.query("SELECT * FROM no_such_table", &[]).await.unwrap_err();
    assert!(matches!(err, DbError::QueryFailed(_)), "got {:?}", err);
    assert!(err.to_string().contains("no_such_table"));
}

#[tokio::test]
async fn test_connection_failure() {
    let mut config = test_config();
    config.port = 1;
    let result = PostgresConnector::new(Duration::from_secs(2)).connect(&config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_connection_tester() {
    if setup().await.is_none() {
        return;
    }
    let tester = ConnectorTester::postgres(Duration::from_secs(5));
    assert!(tester.test(&test_config()).await);

    let mut wrong = test_config();
    wrong.database = Some("pgfunc_no_such_database".to_string());
    assert!(!tester.test(&wrong).await);
}

#[tokio::test]
async fn test_list_schemas() {
    if setup().await.is_none() {
        return;
    }
    let schemas = SchemaService::new(connector()).list_schemas(&test_config()).await;
    assert!(schemas.contains(&"public".to_string()));
    assert!(schemas.contains(&SCHEMA.to_string()));
    assert!(!schemas.iter().any(|s| s == "pg_catalog" || s == "information_schema"));

    let mut sorted = schemas.clone();
    sorted.sort();
    assert_eq!(schemas, sorted);
}

#[tokio::test]
async fn test_list_functions_and_zero_arg_filter() {
    if setup().await.is_none() {
        return;
    }
    let service = FunctionService::new(connector());
    let all = service.list_functions(&test_config(), SCHEMA).await;
    let names: Vec<&str> = all.iter().map(|f| f.name.as_str()).collect();
    for expected in ["answer", "greet", "plus_one", "slow", "touch"] {
        assert!(names.contains(&expected), "missing {} in {:?}", expected, names);
    }

    let zero_arg = service.list_zero_arg_functions(&test_config(), SCHEMA).await;
    let zero_names: Vec<&str> = zero_arg.iter().map(|f| f.name.as_str()).collect();
    assert!(zero_names.contains(&"answer"));
    assert!(zero_names.contains(&"touch"));
    assert!(!zero_names.contains(&"plus_one"));
    assert!(!zero_names.contains(&"greet"));

    let touch = zero_arg.iter().find(|f| f.name == "touch").unwrap();
    assert_eq!(touch.return_type, "void");
}

#[tokio::test]
async fn test_list_parameters() {
    if setup().await.is_none() {
        return;
    }
    let service = FunctionService::new(connector());
    let greet = service
        .list_functions(&test_config(), SCHEMA)
        .await
        .into_iter()
        .find(|f| f.name == "greet")
        .expect("greet should be listed");
    assert_eq!(greet.input_arity, 2);

    let parameters = service
        .list_parameters(&test_config(), SCHEMA, &greet.specific_name)
        .await;
    assert_eq!(parameters.len(), 2);
    assert_eq!(parameters[0].name, "who");
    assert_eq!(parameters[0].mode, ParameterMode::In);
    assert_eq!(parameters[1].name, "n");
    assert_eq!(parameters[1].mode, ParameterMode::InOut);
    assert_eq!(parameters[1].data_type, "integer");
}

#[tokio::test]
async fn test_execute_zero_arg_function() {
    if setup().await.is_none() {
        return;
    }
    let mut t = task("answer", vec![]);
    assert!(t.run(&NoopListener).await);
    assert_eq!(t.state(), TaskState::Succeeded);
    assert_eq!(t.result().and_then(|r| r.scalar()), Some(&CellValue::Integer(42)));
}

#[tokio::test]
async fn test_execute_void_function() {
    if setup().await.is_none() {
        return;
    }
    let mut t = task("touch", vec![]);
    assert!(t.run(&NoopListener).await);
    assert_eq!(t.result().map(|r| r.row_count), Some(1));
    assert_eq!(t.result().and_then(|r| r.scalar()), Some(&CellValue::Null));
}

#[tokio::test]
async fn test_execute_with_bound_argument() {
    if setup().await.is_none() {
        return;
    }
    let mut t = task("plus_one", vec![ParamValue::from_arg("41")]);
    assert!(t.run(&NoopListener).await);
    assert_eq!(t.result().and_then(|r| r.scalar()), Some(&CellValue::Integer(42)));
}

#[tokio::test]
async fn test_execute_set_returning_function_renders_records() {
    if setup().await.is_none() {
        return;
    }
    let mut t = task("pairs", vec![]);
    assert!(t.run(&NoopListener).await);
    let results = t.result().unwrap();
    assert_eq!(results.columns[0].name, "pairs");
    assert_eq!(results.columns[0].type_name, "record");
    let values: Vec<&CellValue> = results.rows.iter().map(|r| &r.values[0]).collect();
    assert_eq!(
        values,
        vec![&CellValue::Text("(1,a)".into()), &CellValue::Text("(2,b)".into())]
    );
}

#[tokio::test]
async fn test_execute_point_function_renders_text() {
    if setup().await.is_none() {
        return;
    }
    let mut t = task("pt", vec![]);
    assert!(t.run(&NoopListener).await);
    assert_eq!(t.result().map(|r| r.columns[0].type_name.as_str()), Some("point"));
    assert_eq!(
        t.result().and_then(|r| r.scalar()),
        Some(&CellValue::Text("(1,2)".into()))
    );
}

#[tokio::test]
async fn test_mixed_columns_keep_native_values() {
    let Some(client) = setup().await else { return };
    let results = client
        .query("SELECT 7 AS n, point(3, 4) AS p, $1::text AS t", &[ParamValue::from_arg("x")])
        .await
        .expect("Query should succeed");
    assert_eq!(results.columns[1].name, "p");
    assert_eq!(
        results.rows[0].values,
        vec![
            CellValue::Integer(7),
            CellValue::Text("(3,4)".into()),
            CellValue::Text("x".into()),
        ]
    );
}

#[tokio::test]
async fn test_execute_missing_function_fails() {
    if setup().await.is_none() {
        return;
    }
    let mut t = task("does_not_exist", vec![]);
    assert!(!t.run(&NoopListener).await);
    assert_eq!(t.state(), TaskState::Failed);
    assert!(t.error_message().unwrap().contains("does_not_exist"));
}

#[tokio::test]
async fn test_cancel_running_function() {
    if setup().await.is_none() {
        return;
    }
    let mut t = task("slow", vec![]);
    let token = t.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
    });

    let ok = tokio::time::timeout(Duration::from_secs(10), t.run(&NoopListener))
        .await
        .expect("server should honour the cancel request");
    assert!(!ok);
    assert_eq!(t.state(), TaskState::Cancelled);
    assert!(t.result().is_none());
    assert!(t.elapsed() < Duration::from_secs(10));
}
