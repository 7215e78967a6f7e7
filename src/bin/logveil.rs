use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use logveil::enrich::Enricher;
use logveil::masker::{IpMasker, DEFAULT_MAX_MAPPINGS};
use logveil::parser;
use logveil::summary::{self, SecuritySummary};

#[derive(Parser, Debug)]
#[command(name = "logveil", version, about = "Security log triage with reversible IP pseudonymization")]
struct Cli {
    /// Log file to analyze (.csv parses as delimited; everything else as plain text)
    input: Option<PathBuf>,

    /// Emit the corpus summary instead of per-record JSON lines
    #[arg(long, default_value_t = false)]
    summary: bool,

    /// Pseudonymize every IPv4 literal in the printed output
    #[arg(long, default_value_t = false)]
    mask: bool,

    /// Kill switch: never mask, even when --mask is set
    #[arg(long = "no-mask", default_value_t = false)]
    no_mask: bool,

    /// Directory holding the mapping and key stores
    #[arg(long = "state-dir", default_value = ".logveil")]
    state_dir: PathBuf,

    /// Mapping entries kept across restarts (oldest evicted on reload)
    #[arg(long = "max-mappings", default_value_t = DEFAULT_MAX_MAPPINGS)]
    max_mappings: usize,

    /// Print the pseudonym -> original table and exit
    #[arg(long = "show-mapping", default_value_t = false)]
    show_mapping: bool,

    /// Clear the mapping store and exit
    #[arg(long = "clear-mappings", default_value_t = false)]
    clear_mappings: bool,

    /// Show the records surrounding this record index and exit
    #[arg(long)]
    context: Option<usize>,

    /// Context radius for --context
    #[arg(long = "context-lines", default_value_t = 5)]
    context_lines: usize,
}

#[derive(Serialize)]
struct SummaryOut {
    generated_at: String,
    #[serde(flatten)]
    summary: SecuritySummary,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.show_mapping || cli.clear_mappings {
        let mut masker = open_masker(&cli)?;
        if cli.clear_mappings {
            masker.clear().context("failed to clear mapping store")?;
            eprintln!("mapping store cleared");
            return Ok(());
        }
        let table = serde_json::to_string_pretty(&masker.get_mapping())?;
        println!("{table}");
        return Ok(());
    }

    let Some(input) = &cli.input else {
        bail!("no input file given (see --help)");
    };

    let mut records = parser::parse_file(input)
        .with_context(|| format!("cannot analyze {}", input.display()))?;
    Enricher::default().enrich(&mut records);

    let masking = cli.mask && !cli.no_mask;
    let mut masker = if masking { Some(open_masker(&cli)?) } else { None };
    let mut emit = |text: String| {
        match masker.as_mut() {
            Some(m) => println!("{}", m.mask_text(&text)),
            None => println!("{text}"),
        }
    };

    if let Some(index) = cli.context {
        if index >= records.len() {
            bail!("record index {index} out of range ({} records)", records.len());
        }
        emit(summary::alert_context(&records, index, cli.context_lines));
    } else if cli.summary {
        let out = SummaryOut {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            summary: summary::summarize(&records),
        };
        emit(serde_json::to_string_pretty(&out)?);
    } else {
        for rec in &records {
            emit(serde_json::to_string(rec)?);
        }
    }
    Ok(())
}

fn open_masker(cli: &Cli) -> Result<IpMasker> {
    IpMasker::open(&cli.state_dir, cli.max_mappings)
        .with_context(|| format!("cannot open state dir {}", cli.state_dir.display()))
}
