//! schemaload — load a source tree into PostgreSQL
//!
//! # Usage
//!
//! ```bash
//! # Load ./db into a database
//! schemaload load db --database-url postgres://localhost/app
//!
//! # Show what would run, without a database
//! schemaload plan db
//!
//! # Show the classification rules in effect
//! schemaload rules
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use schemaload::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "schemaload")]
#[command(version)]
#[command(about = "Load SQL and procedural-language sources into PostgreSQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    schemaload load db --database-url postgres://localhost/app
    schemaload plan db --format json
    schemaload rules")]
struct Cli {
    /// Config file (default: ./schemaload.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every source under ROOT, retrying until nothing more applies
    Load {
        /// Source directory (default: `root` from config)
        root: Option<String>,

        /// Database connection URL
        #[arg(long, env = "SCHEMALOAD_DATABASE_URL")]
        database_url: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the plan of every unit under ROOT without connecting
    Plan {
        /// Source directory (default: `root` from config)
        root: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the classification rules in effect
    Rules,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("schemaload=debug")
        } else {
            EnvFilter::new("schemaload=info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = LoaderConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Load {
            root,
            database_url,
            format,
        } => {
            let root = root.unwrap_or_else(|| config.root.clone());
            let url = database_url
                .or_else(|| config.database_url.clone())
                .context("No database URL. Use --database-url or set SCHEMALOAD_DATABASE_URL")?;
            load(config, &root, &url, format).await
        }
        Commands::Plan { root, format } => {
            let root = root.unwrap_or_else(|| config.root.clone());
            plan(config, &root, format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Rules => {
            show_rules(&config.rule_set()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn load(config: LoaderConfig, root: &str, url: &str, format: OutputFormat) -> Result<ExitCode> {
    let loader = Loader::new(config)?;
    let target = PgTarget::from_url(url)?;
    target.ping().await.context("Cannot reach the database")?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "Interrupted. Finishing the current unit...".yellow());
            token.cancel();
        }
    });

    let outcome = loader
        .load(&LocalFs, root, &target, cancel)
        .await
        .with_context(|| format!("Failed to load {}", root))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Table => {
            print!("{}", outcome.report.render_table(60));
            let summary = &outcome.summary;
            println!(
                "{} passes, {} sessions, {} ms",
                summary.passes.to_string().cyan(),
                summary.sessions.to_string().cyan(),
                (summary.finished_at - summary.started_at).num_milliseconds()
            );
            if summary.cancelled {
                println!("{}", "⚠ Run was cancelled".yellow());
            }
        }
    }

    if outcome.report.has_failures() || outcome.summary.cancelled {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn plan(config: LoaderConfig, root: &str, format: OutputFormat) -> Result<()> {
    let loader = Loader::new(config)?;
    let planned = loader
        .plan(&LocalFs, root)
        .with_context(|| format!("Failed to read {}", root))?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    if planned.is_empty() {
        println!("{}", "(no units)".dimmed());
        return Ok(());
    }
    for unit in &planned {
        println!(
            "{} {}",
            format!("{}:{}:{}", unit.file, unit.line, unit.column).white().bold(),
            format!("#{}", unit.ordinal).dimmed()
        );
        if let Some(plan) = &unit.plan {
            for step in &plan.steps {
                println!("  {} {}", "•".cyan(), step);
            }
        }
        if let Some(error) = &unit.error {
            println!("  {} {}", "✗".red(), error.red());
        }
    }
    println!();
    println!("{} unit(s)", planned.len().to_string().cyan());
    Ok(())
}

fn show_rules(rules: &RuleSet) {
    println!(
        "{:16} {:12} {:12} {:20} {}",
        "Match".white().bold(),
        "Language".white().bold(),
        "Extension".white().bold(),
        "Processor".white().bold(),
        "Priority".white().bold()
    );
    println!("{}", "─".repeat(72).dimmed());

    for rule in rules.rules() {
        let class = &rule.class;
        let processor = class
            .processor
            .as_deref()
            .or(class.file_processor.as_deref())
            .unwrap_or("-");
        println!(
            "{:16} {:12} {:12} {:20} {}",
            rule.key().cyan().bold(),
            class.language.as_deref().unwrap_or("-").yellow(),
            class.extension.as_deref().unwrap_or("-"),
            processor,
            class.priority.to_string().dimmed()
        );
    }
}
