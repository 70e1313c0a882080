use appinfo_core::backend::{BackendError, KNOWN_BACKENDS};
use appinfo_core::config::Config;
use appinfo_db::store::{Filter, PackageRecord};
use appinfo_db::{PackageClient, PackageServer, Reply, StoreError};
use clap::{CommandFactory, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "appinfo",
    version,
    about = "Package rating metadata on top of your package manager"
)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "Database file (defaults to config)")]
    db: Option<PathBuf>,
    #[arg(
        short = 'b',
        long,
        value_name = "PMS",
        help = "Package management system backend (defaults to config)"
    )]
    backend: Option<String>,
    #[arg(long, value_name = "PATH", help = "Config file to load")]
    config: Option<PathBuf>,
    #[arg(
        short = 'v',
        long = "verbose",
        help = "Increase verbosity",
        conflicts_with = "quiet"
    )]
    verbose: bool,
    #[arg(short = 'q', long = "quiet", help = "Suppress non-error output")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Create the database (existing files are kept unless --force)")]
    Create {
        #[arg(long, help = "Recreate, moving the old file to <db>.backup")]
        force: bool,
    },
    #[command(about = "Add packages known to the backend to the database")]
    Sync,
    #[command(about = "Rate a package from 1 to 5")]
    Rate {
        package: String,
        #[arg(allow_negative_numbers = true)]
        rating: i64,
    },
    #[command(about = "Reset scores for one package, or all packages")]
    Reset { package: Option<String> },
    #[command(about = "Show the average score of a package")]
    Score { package: String },
    #[command(about = "Show the database id of a package")]
    Id { package: String },
    #[command(about = "List stored packages")]
    List {
        #[arg(long, help = "Only packages whose name starts with this")]
        prefix: Option<String>,
        #[arg(long, help = "Print records as JSON")]
        json: bool,
    },
    #[command(about = "List known package management backends")]
    Backends,
    #[command(about = "Print the effective configuration")]
    Config,
    #[command(about = "Generate shell completions")]
    Completions { shell: clap_complete::Shell },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing home directory in environment")]
    MissingHome,
    #[error("config error: {0}")]
    Config(#[from] appinfo_core::config::ConfigError),
    #[error("{0}")]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Failed(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialize config: {0}")]
    Toml(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn info(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", message.as_ref());
        }
    }

    fn verbose(&self, message: impl AsRef<str>) {
        if self.verbose && !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }

    /// Prints a reply and turns failures into an error exit.
    fn reply(&self, reply: Reply) -> Result<(), CliError> {
        if reply.success {
            self.info(reply.message);
            Ok(())
        } else {
            Err(CliError::Failed(reply.message))
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing(&cli);
    let output = Output {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let config = load_config(cli.config.as_deref())?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.store.path.clone());
    let backend_id = cli
        .backend
        .clone()
        .unwrap_or_else(|| config.backend.default.clone());
    tracing::debug!(db = %db_path.display(), backend = %backend_id, "resolved settings");
    output.verbose(format!("db: {} backend: {}", db_path.display(), backend_id));

    match cli.command {
        Command::Create { force } => {
            let mut server = open_server(&backend_id, &config, output)?;
            let reply = Reply::from_result(server.create_database(&db_path, force), |_| {
                "DB created successfully.".to_string()
            })?;
            output.reply(reply)
        }
        Command::Sync => {
            let mut server = open_server(&backend_id, &config, output)?;
            let result = server
                .initialize_database(&db_path)
                .and_then(|_| server.synchronize());
            let reply =
                Reply::from_result(result, |count| format!("{} package inserted.", count))?;
            output.reply(reply)
        }
        Command::Rate { package, rating } => {
            let mut server = open_server(&backend_id, &config, output)?;
            let result = server
                .initialize_database(&db_path)
                .and_then(|_| server.rate(&package, rating));
            let reply = Reply::from_result(result, |records| {
                records
                    .iter()
                    .map(format_record)
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
            output.reply(reply)
        }
        Command::Reset { package } => {
            let mut server = open_server(&backend_id, &config, output)?;
            let result = server
                .initialize_database(&db_path)
                .and_then(|_| server.reset_scores(package.as_deref()));
            let reply = Reply::from_result(result, |_| "All scores reset.".to_string())?;
            output.reply(reply)
        }
        Command::Score { package } => {
            let client = open_client(&backend_id, &config, &db_path)?;
            let reply = Reply::from_result(client.score(&package), |score| score.to_string())?;
            output.reply(reply)
        }
        Command::Id { package } => {
            let client = open_client(&backend_id, &config, &db_path)?;
            let result = client.id(&package).and_then(|id| {
                id.ok_or_else(|| StoreError::PackageNotFound(package.clone()))
            });
            let reply = Reply::from_result(result, |id| id.to_string())?;
            output.reply(reply)
        }
        Command::List { prefix, json } => {
            let client = open_client(&backend_id, &config, &db_path)?;
            let filter = prefix.map(Filter::NamePrefix);
            let records = client.records(filter.as_ref())?;
            if json {
                output.info(serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                output.info("no packages stored");
            } else {
                for record in &records {
                    output.info(format_record(record));
                }
            }
            Ok(())
        }
        Command::Backends => {
            for id in KNOWN_BACKENDS {
                if *id == config.backend.default {
                    output.info(format!("{} (default)", id));
                } else {
                    output.info(*id);
                }
            }
            Ok(())
        }
        Command::Config => {
            output.info(toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "appinfo", &mut io::stdout());
            Ok(())
        }
    }
}

fn open_server(
    backend_id: &str,
    config: &Config,
    output: Output,
) -> Result<PackageServer, CliError> {
    let server = PackageServer::new(backend_id, config)?;
    output.verbose(format!("package source: {}", server.backend()));
    Ok(server)
}

/// Opens a read client, reporting a missing database as a plain failure.
fn open_client(
    backend_id: &str,
    config: &Config,
    db_path: &Path,
) -> Result<PackageClient, CliError> {
    let mut client = PackageClient::new(backend_id, config)?;
    match client.initialize_database(db_path) {
        Ok(()) => Ok(client),
        Err(err) if err.is_expected() => Err(CliError::Failed(err.to_string())),
        Err(err) => Err(err.into()),
    }
}

fn format_record(record: &PackageRecord) -> String {
    format!(
        "{} {} score={} ratings={} average={}",
        record.id,
        record.name,
        record.score,
        record.nose,
        record.average_score()
    )
}

fn load_config(explicit: Option<&Path>) -> Result<Config, CliError> {
    match explicit {
        Some(path) => Ok(Config::load_from_path(path)?),
        None => match config_path() {
            Ok(path) => Ok(Config::load_or_default(&path)?),
            Err(CliError::MissingHome) => Ok(Config::default()),
            Err(err) => Err(err),
        },
    }
}

fn config_dir() -> Result<PathBuf, CliError> {
    home_dir().map(|home| home.join(".config").join("appinfo"))
}

fn config_path() -> Result<PathBuf, CliError> {
    Ok(config_dir()?.join("config.toml"))
}

fn home_dir() -> Result<PathBuf, CliError> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| CliError::MissingHome)
}
