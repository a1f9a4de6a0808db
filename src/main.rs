#![deny(warnings)]
#![deny(clippy::all)]

use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use clap::Parser;
use fusiondirectory_lib::{
    config::Config,
    dao::FusionDirectoryDao,
    datasets::{Bean, ModificationItems, Modifications, Operation},
    service::{DestinationService, Service, SourceService, WritableService},
    worker,
};

#[derive(Parser, Debug)]
#[command(author, version)]
/// Inspect and change FusionDirectory objects through its REST API, the same way the synchronization
/// connector does. Handy to check a connector configuration before running a synchronization with it.
struct CliArguments {
    #[clap(long, short, default_value = "fusiondirectory.toml", help = "The TOML file holding connection and service settings")]
    config: PathBuf,

    #[clap(long, value_enum, default_value = "destination", help = "Which configured service to use")]
    side: Side,

    #[command(subcommand)]
    command: Command,

    #[clap(flatten)]
    log_level: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum Side {
    Source,
    Destination,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Log in and check the session is usable
    Ping,
    /// List all objects of the service, keyed by pivot value
    List,
    /// Show the configured attributes of the object with the given pivot value
    Show { pivot: String },
    /// List the configured attribute names
    Attributes,
    /// Apply the modifications read from a JSON file (destination only)
    Apply { file: PathBuf },
    /// Delete the object with the given pivot value (destination only)
    Delete { pivot: String },
}

enum Connector {
    Source(SourceService),
    Destination(DestinationService),
}

impl Connector {
    fn new(config: &Config, side: Side) -> anyhow::Result<Self> {
        Ok(match side {
            Side::Source => Connector::Source(SourceService::from_config(config)?),
            Side::Destination => Connector::Destination(DestinationService::from_config(config)?),
        })
    }

    fn service(&self) -> &dyn Service {
        match self {
            Connector::Source(service) => service,
            Connector::Destination(service) => service,
        }
    }

    fn dao(&self) -> &FusionDirectoryDao {
        match self {
            Connector::Source(service) => service.dao(),
            Connector::Destination(service) => service.dao(),
        }
    }

    fn writable(&self) -> anyhow::Result<&dyn WritableService> {
        match self {
            Connector::Source(_) => anyhow::bail!("The source service is read-only, use --side destination"),
            Connector::Destination(service) => Ok(service as &dyn WritableService),
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn apply(connector: &Connector, modifications: &Modifications) -> anyhow::Result<()> {
    let applied = connector.writable()?.apply(modifications).await?;
    if !applied {
        anyhow::bail!("FusionDirectory could not be reached, {:?} was not applied", modifications.operation);
    }
    tracing::info!(operation = ?modifications.operation, main_identifier = %modifications.main_identifier, "Applied modifications");
    Ok(())
}

async fn run(connector: Connector, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ping => {
            connector.dao().ping().await?;
            tracing::info!("FusionDirectory session is usable");
        }
        Command::List => print_json(&connector.service().get_list_pivots().await?)?,
        Command::Show { pivot } => {
            let dao = connector.dao();
            let (main_identifier, found) = dao
                .find_first_by_pivot(&pivot)
                .await?
                .with_context(|| format!("No object with {}={}", dao.pivot_name(), pivot))?;
            let dn = found.string_value("dn").context("Search result without DN")?;
            let datasets = dao.get_details(&dn).await?;
            print_json(&Bean { main_identifier, datasets })?;
        }
        Command::Attributes => print_json(&connector.dao().attribute_names())?,
        Command::Apply { file } => {
            let content = std::fs::read_to_string(&file).with_context(|| format!("Failed to read modifications file: {}", file.display()))?;
            let modifications: Modifications =
                serde_json::from_str(&content).with_context(|| format!("Failed to parse modifications file: {}", file.display()))?;
            apply(&connector, &modifications).await?;
        }
        Command::Delete { pivot } => {
            let modifications = Modifications {
                operation: Operation::Delete,
                main_identifier: pivot,
                items: ModificationItems::new(),
            };
            apply(&connector, &modifications).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArguments::parse();

    tracing_subscriber::fmt()
        // Use configured log level for our crates, and WARN for everything else.
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::Directive::from_str(&format!(
                    "fusiondirectory_lib={}",
                    args.log_level.log_level_filter().as_str()
                ))?)
                .from_env()?
                .add_directive(tracing_subscriber::filter::Directive::from_str(&format!(
                    "fusiondirectory_connector={}",
                    args.log_level.log_level_filter().as_str()
                ))?)
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::try_from(args.config.as_path())?;
    tracing::debug!(?config, "Loaded configuration");
    let connector = Connector::new(&config, args.side)?;

    worker::scope("cli", run(connector, args.command)).await
}
