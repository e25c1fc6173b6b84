use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wfactory_engine::{FactoryConfig, WorkflowFactory};
use wfactory_source::FsTemplateSource;

/// wfactory - Materialize Pegasus DAX workflow templates into instance graphs
#[derive(Parser)]
#[command(name = "wfactory")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Directory holding `<name>.xml` templates (default: ~/.wfactory/templates)
  #[arg(long, global = true)]
  templates_dir: Option<PathBuf>,

  /// Factory configuration file (JSON)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Base URL that instance URIs are rooted at
  #[arg(long, global = true, default_value = "http://localhost:8080")]
  base_url: String,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// List the templates available in the templates directory
  List,

  /// Print a parsed template as JSON
  Template {
    /// Template name (file stem)
    name: String,
  },

  /// Create instances of a template and print the result as JSON
  Instantiate {
    /// Template name (file stem)
    name: String,

    /// Number of instances to create
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Print the whole ledger instead of the last instance
    #[arg(long)]
    ledger: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let templates_dir = match cli.templates_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".wfactory")
      .join("templates"),
  };

  let config = match &cli.config {
    Some(path) => FactoryConfig::from_file(path)
      .with_context(|| format!("failed to load config: {}", path.display()))?,
    None => FactoryConfig::default(),
  };

  let rt = tokio::runtime::Runtime::new()?;

  match cli.command {
    Some(Commands::List) => rt.block_on(list_templates(templates_dir)),
    Some(Commands::Template { name }) => rt.block_on(show_template(templates_dir, config, name)),
    Some(Commands::Instantiate {
      name,
      count,
      ledger,
    }) => rt.block_on(instantiate(
      templates_dir,
      config,
      name,
      cli.base_url,
      count,
      ledger,
    )),
    None => {
      println!("wfactory - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

async fn list_templates(templates_dir: PathBuf) -> Result<()> {
  let source = FsTemplateSource::new(&templates_dir);
  let names = source
    .list()
    .await
    .with_context(|| format!("failed to list templates in {}", templates_dir.display()))?;

  for name in names {
    println!("{name}");
  }
  Ok(())
}

async fn show_template(templates_dir: PathBuf, config: FactoryConfig, name: String) -> Result<()> {
  let factory = WorkflowFactory::new(FsTemplateSource::new(templates_dir), config)
    .context("failed to create workflow factory")?;

  let template = factory
    .get_template(&name)
    .await
    .with_context(|| format!("failed to load template '{name}'"))?;

  println!("{}", serde_json::to_string_pretty(template.as_ref())?);
  Ok(())
}

async fn instantiate(
  templates_dir: PathBuf,
  config: FactoryConfig,
  name: String,
  base_url: String,
  count: usize,
  ledger: bool,
) -> Result<()> {
  if count == 0 {
    bail!("--count must be at least 1");
  }

  let factory = WorkflowFactory::new(FsTemplateSource::new(templates_dir), config)
    .context("failed to create workflow factory")?;

  factory
    .get_template(&name)
    .await
    .with_context(|| format!("failed to load template '{name}'"))?;

  let mut slot = 0;
  for _ in 0..count {
    slot = factory
      .create_instance(&name, &base_url)
      .await
      .with_context(|| format!("failed to create instance of '{name}'"))?;
  }

  if ledger {
    let snapshot = factory.get_instance_list(&name)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
  } else {
    let record = factory.get_instance(&name, slot)?;
    println!("{}", serde_json::to_string_pretty(record.as_ref())?);
  }

  Ok(())
}
