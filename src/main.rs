use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

use tripl::persist::{dump_file, load_files};
use tripl::pull::{PullTargets, SortBy};
use tripl::{Cardinality, Pattern, PullExpr, Result, StoreConfig};

#[derive(Parser)]
#[command(name = "tripl", about = "Query and merge entity/attribute/value graphs stored as JSON")]
struct Cli {
    /// Configuration file (TRIPL_* environment variables apply as well).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Follow text values naming known entities as references.
    #[arg(long, global = true)]
    lazy_refs: Option<bool>,

    /// Cardinality of undeclared attributes.
    #[arg(long, global = true, value_enum)]
    cardinality: Option<CardinalityArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CardinalityArg {
    One,
    Many,
}

impl From<CardinalityArg> for Cardinality {
    fn from(arg: CardinalityArg) -> Self {
        match arg {
            CardinalityArg::One => Cardinality::One,
            CardinalityArg::Many => Cardinality::Many,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pull records out of the loaded files.
    Pull {
        /// Pull expression as JSON, e.g. '["*", {"person:parent": "..."}]'.
        #[arg(long, short)]
        expr: String,
        /// Entities to pull from.
        #[arg(long = "eid", conflicts_with = "pattern")]
        eids: Vec<String>,
        /// Pull every entity matching this JSON pattern instead.
        #[arg(long, short)]
        pattern: Option<String>,
        /// Attribute to sort the records by.
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long, requires = "sort_by")]
        descending: bool,
        files: Vec<PathBuf>,
    },
    /// List the eids matching a JSON pattern.
    Match {
        #[arg(long, short)]
        pattern: String,
        files: Vec<PathBuf>,
    },
    /// Merge the files into one saved index.
    Merge {
        #[arg(long, short)]
        output: PathBuf,
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = StoreConfig::load(cli.config.as_deref())?;
    if cli.lazy_refs.is_some() {
        config.lazy_refs = cli.lazy_refs;
    }
    if let Some(cardinality) = cli.cardinality {
        config.default_cardinality = Some(cardinality.into());
    }

    match cli.command {
        Commands::Pull {
            expr,
            eids,
            pattern,
            sort_by,
            descending,
            files,
        } => {
            let store = load_files(&files, None, config)?;
            let expr = PullExpr::parse(&expr)?;
            let targets = match pattern {
                Some(pattern) => PullTargets::Pattern(parse_pattern(&pattern)?),
                None => PullTargets::Eids(eids.into_iter().map(Into::into).collect()),
            };
            let sort = match sort_by {
                Some(attribute) if descending => Some(SortBy::descending(&attribute)?),
                Some(attribute) => Some(SortBy::ascending(&attribute)?),
                None => None,
            };
            let records = store.pull_many(&expr, targets, sort.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Match { pattern, files } => {
            let store = load_files(&files, None, config)?;
            let eids = store.match_pattern(&parse_pattern(&pattern)?);
            println!("{}", serde_json::to_string_pretty(&eids)?);
        }
        Commands::Merge { output, files } => {
            let store = load_files(&files, None, config)?;
            dump_file(&store, &output)?;
        }
    }
    Ok(())
}

fn parse_pattern(text: &str) -> Result<Pattern> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Pattern::from_json(&json)
}
