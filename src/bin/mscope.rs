//! mscope - inspect request scopes and field ownership from the command line.

use std::fs;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::debug;

use metaserver_scope::config::{
    new_default_edge_core_config, new_min_edge_core_config, HostResolver, StaticHostResolver,
    SystemHostResolver,
};
use metaserver_scope::fieldpath::{APIVersion, FieldSet};
use metaserver_scope::identity::ResourceIdentity;
use metaserver_scope::merge::{FieldOwnershipTracker, OwnershipError, TopLevelFieldManager};
use metaserver_scope::scope::{RequestScope, RouteConfig};
use metaserver_scope::value::Object;

#[derive(Parser)]
#[command(name = "mscope")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output location. Use '-' for stdout
    #[arg(short, long, global = true, default_value = "-")]
    output: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MSCOPE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default node configuration
    Defaults {
        /// Print the minimal configuration instead
        #[arg(long)]
        min: bool,

        /// Hostname to use instead of the system's
        #[arg(long, requires = "ip")]
        hostname: Option<String>,

        /// Local IP to use instead of the system's
        #[arg(long, requires = "hostname")]
        ip: Option<IpAddr>,
    },

    /// Print the top-level fields a YAML/JSON object claims
    Fieldset {
        file: PathBuf,

        /// Extra top-level keys to leave untracked
        #[arg(long = "ignore")]
        ignored: Vec<String>,
    },

    /// Apply a config file over a live object
    Apply {
        #[command(flatten)]
        write: WriteArgs,

        /// Take ownership of contested fields
        #[arg(long)]
        force: bool,
    },

    /// Replace a live object with a config file
    Update {
        #[command(flatten)]
        write: WriteArgs,
    },

    /// Resolve the serializers a request would get
    Negotiate {
        /// Route configuration file; defaults to a JSON/YAML route
        #[arg(long)]
        route: Option<PathBuf>,

        /// Accepted media types in preference order
        #[arg(long)]
        accept: Vec<String>,

        #[arg(long, default_value = "")]
        content_type: String,
    },
}

#[derive(clap::Args)]
struct WriteArgs {
    /// Live object; omitted means the object does not exist yet
    #[arg(long)]
    live: Option<PathBuf>,

    /// Object supplied by the writer
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    manager: String,

    /// API version recorded with the claim; defaults to the config's apiVersion
    #[arg(long)]
    api_version: Option<String>,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut output: Box<dyn Write> = if cli.output == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(
            fs::File::create(&cli.output)
                .with_context(|| format!("Failed to create output file {:?}", cli.output))?,
        )
    };

    match cli.command {
        Commands::Defaults { min, hostname, ip } => defaults(min, hostname, ip, &mut output),
        Commands::Fieldset { file, ignored } => fieldset(&file, &ignored, &mut output),
        Commands::Apply { write, force } => run_write(&write, Some(force), &mut output),
        Commands::Update { write } => run_write(&write, None, &mut output),
        Commands::Negotiate {
            route,
            accept,
            content_type,
        } => negotiate(route.as_deref(), &accept, &content_type, &mut output),
    }
}

/// Reads a YAML or JSON object; `.json` files are parsed as JSON.
fn read_object(path: &Path) -> Result<Object> {
    let data = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let obj = if path.extension().is_some_and(|e| e == "json") {
        Object::from_json(&data)
    } else {
        Object::from_yaml(&data)
    };
    obj.with_context(|| format!("Failed to parse {:?}", path))
}

fn defaults(
    min: bool,
    hostname: Option<String>,
    ip: Option<IpAddr>,
    output: &mut dyn Write,
) -> Result<()> {
    let resolver: Box<dyn HostResolver> = match (hostname, ip) {
        (Some(h), Some(ip)) => Box::new(StaticHostResolver::new(h, ip)),
        _ => Box::new(SystemHostResolver),
    };
    let config = if min {
        new_min_edge_core_config(resolver.as_ref())
    } else {
        new_default_edge_core_config(resolver.as_ref())
    };
    write!(output, "{}", config.to_yaml()?)?;
    Ok(())
}

fn tracker(ignored: &[String]) -> TopLevelFieldManager {
    let ignored: FieldSet = ignored.iter().map(String::as_str).collect();
    TopLevelFieldManager::builder().ignored_fields(ignored).build()
}

fn fieldset(file: &Path, ignored: &[String], output: &mut dyn Write) -> Result<()> {
    let obj = read_object(file)?;
    for path in tracker(ignored).compute_field_set(&obj).iter() {
        writeln!(output, "{}", path)?;
    }
    Ok(())
}

/// Runs an apply (`force` set) or an update (`force` unset).
fn run_write(args: &WriteArgs, force: Option<bool>, output: &mut dyn Write) -> Result<()> {
    let live = match &args.live {
        Some(path) => read_object(path)?,
        None => Object::new(),
    };
    let config = read_object(&args.config)?;
    let version = APIVersion::new(
        args.api_version
            .clone()
            .or_else(|| config.api_version().map(str::to_string))
            .unwrap_or_default(),
    );
    debug!(manager = %args.manager, %version, "running ownership tracker");

    let tracker = tracker(&[]);
    let now = Utc::now();
    let result = match force {
        Some(force) => tracker.apply_patch(&live, &config, &args.manager, &version, now, force),
        None => tracker.apply_update(&live, &config, &args.manager, &version, now),
    };

    match result {
        Ok(obj) => {
            write!(output, "{}", obj.to_yaml()?)?;
            Ok(())
        }
        Err(OwnershipError::Conflicts(conflicts)) => {
            for c in conflicts.iter() {
                eprintln!("  {}", c);
            }
            bail!("apply failed with {} conflict(s); retry with --force", conflicts.len())
        }
        Err(e) => Err(e.into()),
    }
}

fn negotiate(
    route: Option<&Path>,
    accept: &[String],
    content_type: &str,
    output: &mut dyn Write,
) -> Result<()> {
    let route = match route {
        Some(path) => {
            let data = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
            RouteConfig::from_yaml(&data).with_context(|| format!("Failed to parse {:?}", path))?
        }
        None => RouteConfig::new(ResourceIdentity::new("", "v1", "ConfigMap", "configmaps")),
    };
    let scope = RequestScope::build(route)?;
    let negotiated = scope.serializer().resolve(accept, content_type)?;
    writeln!(output, "encoder: {}", negotiated.encoder.media_type())?;
    writeln!(output, "decoder: {}", negotiated.decoder.media_type())?;
    Ok(())
}
