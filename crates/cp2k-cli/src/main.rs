use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use cp2k_log::dispatch::{HEADER_PROBE_LINES, detect_version};
use cp2k_log::{
    Cp2kParser, EventRecorder, JsonTreeBackend, ParseStatus, ParserOptions, VersionRegistry,
};
use serde_json::json;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cp2k")]
#[command(about = "CP2K output log tools", long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CP2K output file and emit JSON
    Parse {
        /// Path to the CP2K output file
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Use the rules for this CP2K version instead of detecting it
        #[arg(long, value_name = "VERSION")]
        version: Option<String>,

        /// Only forward these quantities (repeatable)
        #[arg(long, value_name = "QUANTITY")]
        keep: Vec<String>,

        /// Never forward these quantities (repeatable)
        #[arg(long, value_name = "QUANTITY")]
        skip: Vec<String>,

        /// Do not read the energy and trajectory files an MD run writes
        #[arg(long)]
        no_aux: bool,

        /// Parser options file (JSON); flags override its values
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Tree)]
        format: Format,
    },
    /// Report the version banner and the rules it selects
    Detect {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// List the versions with built-in rules
    Versions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Nested sections, one JSON object per section
    Tree,
    /// Flat list of backend events in emission order
    Events,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_default_env()
        .filter_level(level(cli.verbose))
        .init();

    match cli.command {
        Commands::Parse {
            path,
            version,
            keep,
            skip,
            no_aux,
            config,
            format,
        } => {
            let mut options = match &config {
                Some(config) => ParserOptions::load_from_path(config)?,
                None => ParserOptions::default(),
            };
            apply_flags(&mut options, version, keep, skip, no_aux);
            let output = parse(&path, options, format)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Detect { path } => {
            let lines = probe(&path)?;
            let detected = detect_version(&lines);
            let registry = VersionRegistry::builtin();
            let selection = match &detected {
                Some(version) => registry.select(version),
                None => registry.select_default(),
            };
            let report = json!({
                "detected": detected,
                "rules": selection.version,
                "dialect": format!("{:?}", selection.factory.dialect()).to_lowercase(),
                "fallback": selection.is_fallback(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Versions => {
            let registry = VersionRegistry::builtin();
            for (version, dialect) in registry.versions() {
                let marker = if version == registry.default_version() {
                    " (default)"
                } else {
                    ""
                };
                println!("{version}\t{dialect:?}{marker}");
            }
        }
    }
    Ok(())
}

fn level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn apply_flags(
    options: &mut ParserOptions,
    version: Option<String>,
    keep: Vec<String>,
    skip: Vec<String>,
    no_aux: bool,
) {
    if version.is_some() {
        options.version = version;
    }
    options.keep.extend(keep);
    options.skip.extend(skip);
    if no_aux {
        options.read_auxiliary_files = false;
    }
}

fn parse(path: &Path, options: ParserOptions, format: Format) -> anyhow::Result<serde_json::Value> {
    let parser = Cp2kParser::new(options)?;
    let (outcome, body) = match format {
        Format::Tree => {
            let parsed = parser
                .parse_file(path, JsonTreeBackend::new())
                .with_context(|| format!("failed to parse {}", path.display()))?;
            (parsed.outcome, parsed.backend.into_json())
        }
        Format::Events => {
            let parsed = parser
                .parse_file(path, EventRecorder::new())
                .with_context(|| format!("failed to parse {}", path.display()))?;
            (parsed.outcome, json!(parsed.backend.into_events()))
        }
    };

    for warning in &outcome.warnings {
        log::warn!("{}: {warning}", path.display());
    }
    log::info!(
        "{}: {} line(s), rules for {}, status {:?}",
        path.display(),
        outcome.lines,
        outcome.version,
        outcome.status
    );
    if outcome.status == ParseStatus::Failure {
        bail!("no CP2K run found in {}", path.display());
    }
    let mut output = serde_json::Map::new();
    output.insert("outcome".to_string(), json!(outcome));
    let key = match format {
        Format::Tree => "tree",
        Format::Events => "events",
    };
    output.insert(key.to_string(), body);
    Ok(serde_json::Value::Object(output))
}

/// Leading lines of `path`, decoded lossily.
fn probe(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    BufReader::new(file)
        .split(b'\n')
        .take(HEADER_PROBE_LINES)
        .map(|line| {
            line.map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_string())
                .with_context(|| format!("failed to read {}", path.display()))
        })
        .collect()
}
