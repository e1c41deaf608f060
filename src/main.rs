use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hyperbucket::api::error::format_api_error;
use hyperbucket::{Client, Config, Item, Traversal};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Hypermedia client for the Bitbucket API
#[derive(Parser, Debug)]
#[command(name = "hyperbucket", version, about, long_about = None)]
struct Args {
    /// Bitbucket API base URI
    #[arg(long)]
    server: Option<String>,

    /// Account name used by finders that need an owner
    #[arg(short, long)]
    username: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the saved configuration, or change it
    Config {
        /// Save this API base URI (empty to clear)
        #[arg(long, value_name = "URI")]
        set_server: Option<String>,

        /// Save this username (empty to clear)
        #[arg(long, value_name = "NAME")]
        set_username: Option<String>,
    },

    /// List the relationships of the root entry point
    Relations,

    /// Follow a root relationship, expanding its template with the given variables
    Walk {
        /// Relationship name, e.g. repositoryByOwnerAndRepositoryName
        relationship: String,

        /// Template variable; repeat a key to pass a list
        #[arg(short = 'v', long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Traverse an absolute URL
    Get {
        url: String,

        /// Key holding a page's items
        #[arg(long, default_value = hyperbucket::resource::traversal::DEFAULT_ITEMS_KEY)]
        items_key: String,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Stop after this many items
    #[arg(short, long)]
    limit: Option<usize>,

    /// Print each item as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Repeated keys become lists, for exploded template variables
fn template_vars(pairs: &[(String, String)]) -> Value {
    let mut vars = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.clone());
        match vars.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                vars.insert(key.clone(), value);
            }
        }
    }
    Value::Object(vars)
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("hyperbucket started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("hyperbucket").join("hyperbucket.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".hyperbucket").join("hyperbucket.log");
    }
    PathBuf::from("hyperbucket.log")
}

/// CLI flag wins over the config file
fn effective_log_level(args: &Args, config: &Config) -> LogLevel {
    args.log_level
        .or_else(|| {
            config
                .log_level
                .as_deref()
                .and_then(|level| LogLevel::from_str(level, true).ok())
        })
        .unwrap_or(LogLevel::Off)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load();
    let _log_guard = setup_logging(effective_log_level(&args, &config))?;

    if let Command::Config {
        set_server,
        set_username,
    } = &args.command
    {
        if configure(&mut config, set_server.as_deref(), set_username.as_deref()) {
            config.save()?;
            tracing::info!("Configuration saved");
        }
        print_config(&config);
        return Ok(());
    }

    if let Some(server) = &args.server {
        config.server_base_uri = Some(server.clone());
    }
    if let Some(username) = &args.username {
        config.username = Some(username.clone());
    }

    let client = Client::new(&config)?;
    tracing::info!("Using server: {}", client.bitbucket_url());

    if let Err(err) = run(&client, args.command).await {
        match err.downcast_ref::<hyperbucket::Error>() {
            Some(api_err) => eprintln!("Error: {}", format_api_error(api_err)),
            None => eprintln!("Error: {err:?}"),
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Apply `config` subcommand changes, returning whether anything changed
fn configure(config: &mut Config, server: Option<&str>, username: Option<&str>) -> bool {
    let before = config.clone();
    if let Some(server) = server {
        config.set_server(server);
    }
    if let Some(username) = username {
        config.set_username(username);
    }
    *config != before
}

fn print_config(config: &Config) {
    if let Some(path) = Config::config_path() {
        println!("config file: {}", path.display());
    }
    println!("server:      {}", config.effective_server());
    println!(
        "username:    {}",
        config.effective_username().as_deref().unwrap_or("-")
    );
}

async fn run(client: &Client, command: Command) -> Result<()> {
    match command {
        Command::Config { .. } => {}
        Command::Relations => {
            let root = client.root();
            for relationship in root.relationships() {
                println!("{:<45} {}", relationship.name(), relationship.href());
            }
        }
        Command::Walk {
            relationship,
            vars,
            output,
        } => {
            let traversal = client
                .root()
                .traverse_with(&relationship, &template_vars(&vars))?;
            print_items(traversal, &output).await?;
        }
        Command::Get {
            url,
            items_key,
            output,
        } => {
            let traversal = client.traverse(url).with_items_key(items_key);
            print_items(traversal, &output).await?;
        }
    }
    Ok(())
}

async fn print_items(mut traversal: Traversal, output: &OutputArgs) -> Result<()> {
    let mut count = 0;
    while output.limit.map_or(true, |limit| count < limit) {
        let Some(item) = traversal.next().await else {
            break;
        };
        print_item(&item?, output.json)?;
        count += 1;
    }
    tracing::info!("Printed {} items from {} pages", count, traversal.pages_fetched());
    Ok(())
}

fn print_item(item: &Item, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(item.raw())?);
        return Ok(());
    }

    println!("{}", item);
    if let Some(resource) = item.as_resource() {
        let names = resource.relationship_names();
        if !names.is_empty() {
            println!("  relationships: {}", names.join(", "));
        }
    }
    Ok(())
}
