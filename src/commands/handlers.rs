//! Command execution handlers

use crate::commands::parser::{Command, ConnectionsCommand, RulesCommand};
use crate::config::{ConnectionConfig, Settings, StorageKind};
use crate::db::{FunctionService, ParamValue, PostgresConnector, SchemaService};
use crate::output::{OutputFormat, text_table};
use crate::repository::{
    ConnectionRepository, JsonFileStore, ProfileStore, SettingsFile, SettingsProfileStore,
};
use crate::rules::{DiscoverFunctionsRule, ExecuteFunctionRule, ValidationRule};
use crate::service::ConnectionService;
use crate::task::{
    ChannelListener, FunctionExecutionTask, TaskEvent, TaskListener, TaskNotification,
    TaskRunner, TaskState,
};
use crate::tester::PostgresConnectionTester;
use anyhow::{Context as _, bail};
use std::path::PathBuf;
use std::sync::Arc;

pub type AppConnections = ConnectionService<Box<dyn ProfileStore>, PostgresConnectionTester>;

/// Everything a command needs: settings, profiles and a connector
pub struct Context {
    pub settings: Settings,
    pub connections: AppConnections,
    pub connector: Arc<PostgresConnector>,
    selected: Option<String>,
}

impl Context {
    pub fn new(
        settings: Settings,
        profiles: Option<PathBuf>,
        selected: Option<String>,
    ) -> anyhow::Result<Self> {
        let store = open_store(&settings, profiles)?;
        let tester = PostgresConnectionTester::postgres(settings.test_timeout());
        let connector = Arc::new(PostgresConnector::new(settings.execute_timeout()));
        Ok(Self {
            connections: ConnectionService::new(ConnectionRepository::new(store), tester),
            connector,
            settings,
            selected,
        })
    }

    /// The `-c` profile, else the default one
    fn profile(&self) -> anyhow::Result<ConnectionConfig> {
        Ok(self.connections.resolve(self.selected.as_deref())?)
    }

    fn schema_or_default(&self, schema: Option<String>) -> String {
        schema.unwrap_or_else(|| self.settings.default_schema.clone())
    }
}

/// Open the profile store named by the settings
pub fn open_store(
    settings: &Settings,
    profiles: Option<PathBuf>,
) -> anyhow::Result<Box<dyn ProfileStore>> {
    Ok(match settings.storage {
        StorageKind::Json => {
            let path = match profiles {
                Some(path) => path,
                None => settings.profiles_path()?,
            };
            tracing::debug!("Using JSON profile store {}", path.display());
            Box::new(JsonFileStore::new(path))
        }
        StorageKind::Settings => {
            let path = match profiles {
                Some(path) => path,
                None => settings.settings_path()?,
            };
            tracing::debug!("Using settings profile store {}", path.display());
            let file = SettingsFile::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Box::new(SettingsProfileStore::new(file))
        }
    })
}

/// Execute a parsed command
pub async fn execute(ctx: &Context, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Connections(cmd) => connections(ctx, cmd).await,
        Command::Schemas => {
            let profile = ctx.profile()?;
            let schemas = SchemaService::new(ctx.connector.clone())
                .list_schemas(&profile)
                .await;
            for schema in schemas {
                println!("{}", schema);
            }
            Ok(())
        }
        Command::Functions { schema, all } => {
            let profile = ctx.profile()?;
            let schema = ctx.schema_or_default(schema);
            let service = FunctionService::new(ctx.connector.clone());
            let functions = if all {
                service.list_functions(&profile, &schema).await
            } else {
                service.list_zero_arg_functions(&profile, &schema).await
            };
            let rows: Vec<Vec<String>> = functions
                .into_iter()
                .map(|f| {
                    vec![
                        f.name,
                        f.return_type,
                        f.input_arity.to_string(),
                        f.specific_name,
                    ]
                })
                .collect();
            print!(
                "{}",
                text_table(
                    &headers(&["function", "returns", "args", "specific name"]),
                    &rows,
                    ctx.settings.max_cell_width
                )
            );
            Ok(())
        }
        Command::Params {
            schema,
            specific_name,
        } => {
            let profile = ctx.profile()?;
            let parameters = FunctionService::new(ctx.connector.clone())
                .list_parameters(&profile, &schema, &specific_name)
                .await;
            let rows: Vec<Vec<String>> = parameters
                .into_iter()
                .map(|p| vec![p.position.to_string(), p.name, p.data_type, p.mode.to_string()])
                .collect();
            print!(
                "{}",
                text_table(
                    &headers(&["#", "name", "type", "mode"]),
                    &rows,
                    ctx.settings.max_cell_width
                )
            );
            Ok(())
        }
        Command::Exec {
            schema,
            function,
            args,
            format,
        } => exec(ctx, schema, function, args, format).await,
        Command::Rules(cmd) => rules(ctx, cmd).await,
    }
}

async fn connections(ctx: &Context, command: ConnectionsCommand) -> anyhow::Result<()> {
    let svc = &ctx.connections;
    match command {
        ConnectionsCommand::List => {
            let rows: Vec<Vec<String>> = svc
                .get_all_connections()?
                .into_iter()
                .map(|c| {
                    let database = c.dbname().to_string();
                    vec![
                        if c.is_default { "*" } else { "" }.to_string(),
                        c.name,
                        database,
                        c.host,
                        c.port.to_string(),
                        c.username,
                        c.ssl_mode.as_str().to_string(),
                    ]
                })
                .collect();
            print!(
                "{}",
                text_table(
                    &headers(&["", "name", "database", "host", "port", "user", "sslmode"]),
                    &rows,
                    ctx.settings.max_cell_width
                )
            );
        }
        ConnectionsCommand::Show { name } => {
            let c = svc.require_connection(&name)?;
            println!("name:     {}", c.name);
            println!("host:     {}", c.host);
            println!("port:     {}", c.port);
            println!("database: {}", c.dbname());
            println!("user:     {}", c.username);
            println!(
                "password: {}",
                if c.password.as_deref().is_some_and(|p| !p.is_empty()) {
                    "********"
                } else {
                    ""
                }
            );
            println!("service:  {}", c.service.as_deref().unwrap_or(""));
            println!("sslmode:  {}", c.ssl_mode.as_str());
            println!("default:  {}", c.is_default);
        }
        ConnectionsCommand::Add(args) => {
            let name = args.name.clone();
            svc.add_connection(args.into_config()?)?;
            println!("Connection \"{}\" added", name);
        }
        ConnectionsCommand::Update(args) => {
            let name = args.name.clone();
            let existing = svc.require_connection(&name)?;
            svc.update_connection(args.apply_to(existing)?)?;
            println!("Connection \"{}\" updated", name);
        }
        ConnectionsCommand::Delete { name } => {
            svc.delete_connection(&name)?;
            println!("Connection \"{}\" deleted", name);
        }
        ConnectionsCommand::Default { name } => {
            svc.set_default_connection(&name)?;
            println!("Connection \"{}\" is now the default", name);
        }
        ConnectionsCommand::Test { name } => {
            let profile = svc.resolve(name.as_deref().or(ctx.selected.as_deref()))?;
            if svc.test_connection(&profile).await {
                println!("Connection \"{}\": OK", profile.name);
            } else {
                bail!("connection \"{}\" failed (run with -v for details)", profile.name);
            }
        }
    }
    Ok(())
}

async fn exec(
    ctx: &Context,
    schema: String,
    function: String,
    args: Vec<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let profile = ctx.profile()?;
    let params: Vec<ParamValue> = args.iter().map(|a| ParamValue::from_arg(a)).collect();
    let task = FunctionExecutionTask::new(ctx.connector.clone(), profile, schema, function, params);

    let (listener, mut rx) = ChannelListener::new();
    let handle = TaskRunner::current().submit(task, Arc::new(listener));

    loop {
        tokio::select! {
            notification = rx.recv() => match notification {
                Some(TaskNotification::Progress(event)) => print_event(&event),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !handle.is_cancelled() => {
                eprintln!("Cancelling...");
                handle.cancel();
            }
        }
    }

    let mut task = handle.join().await.context("execution task panicked")?;
    match task.state() {
        TaskState::Succeeded => {
            if let Some(results) = task.take_result() {
                print!("{}", format.render(&results, ctx.settings.max_cell_width));
                if format == OutputFormat::Json {
                    println!();
                }
            }
            Ok(())
        }
        TaskState::Cancelled => bail!("execution cancelled"),
        _ => bail!(
            "{}",
            task.error_message().unwrap_or("execution failed")
        ),
    }
}

async fn rules(ctx: &Context, command: RulesCommand) -> anyhow::Result<()> {
    let profile = ctx.profile()?;
    let ok = match command {
        RulesCommand::Discover { schema } => {
            let rule = DiscoverFunctionsRule::new(ctx.connector.clone(), ctx.schema_or_default(schema));
            eprintln!("{}: {}", rule.name(), rule.description());
            rule.run(&profile, &ConsoleListener).await
        }
        RulesCommand::Run { function, schema } => {
            let rule = ExecuteFunctionRule::new(
                ctx.connector.clone(),
                ctx.schema_or_default(schema),
                function,
            );
            eprintln!("{}: {}", rule.name(), rule.description());
            rule.run(&profile, &ConsoleListener).await
        }
    };
    if !ok {
        bail!("rule failed");
    }
    Ok(())
}

/// Prints progress events to stderr as they arrive
struct ConsoleListener;

impl TaskListener for ConsoleListener {
    fn progress(&self, event: &TaskEvent) {
        print_event(event);
    }
}

fn print_event(event: &TaskEvent) {
    let percent = event
        .percent
        .map(|p| format!("{:>3}%", p))
        .unwrap_or_else(|| "    ".to_string());
    eprintln!(
        "[{:>7.2}s] {} {}",
        event.elapsed.as_secs_f64(),
        percent,
        event.message
    );
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
