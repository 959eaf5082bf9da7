//! CLI for scanning Bitcoin blocks for reused ECDSA r-values

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ruse::detect::{Collision, Correlator};
use ruse::provider::{EsploraClient, RetryPolicy};
use ruse::scan::{ScanStats, Scanner};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ruse")]
#[command(about = "Scan Bitcoin blocks for reused ECDSA signature r-values")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    Scan {
        #[arg(long, help = "First block height to scan")]
        start: u64,

        #[arg(long, help = "Last block height to scan (inclusive)")]
        end: u64,

        #[arg(
            long,
            default_value = "1.0",
            help = "Base seconds to pause between block fetches"
        )]
        pause: f64,

        #[arg(
            long,
            default_value = "r_results.txt",
            help = "File reused r-values are written to"
        )]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(found_reuse) => {
            if found_reuse {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Scan {
            start,
            end,
            pause,
            output,
        } => {
            if start > end {
                bail!("start height {start} is greater than end height {end}");
            }
            if !pause.is_finite() || pause < 0.0 {
                bail!("pause must be a non-negative number of seconds");
            }
            let pause = Duration::from_secs_f64(pause);

            let client = EsploraClient::mainnet(RetryPolicy::new(pause));
            let scanner = Scanner::new(client, pause);
            let mut correlator = Correlator::new();
            let mut stats = ScanStats::default();

            let outcome = scanner.scan(start, end, &mut correlator, &mut stats);

            let collisions = correlator.collisions();
            let report = build_report(&collisions, &correlator, &stats, outcome.is_ok());
            println!("{}", format_output(&report, cli.json)?);

            if !collisions.is_empty() {
                write_record_file(&output, &collisions)?;
                if !cli.json {
                    println!("Reused r-values written to {}", output.display());
                }
            }

            if let Err(e) = outcome {
                bail!("scan aborted after partial results: {e}");
            }
            Ok(!collisions.is_empty())
        }
    }
}

#[derive(Serialize)]
struct OutputReport {
    collisions: Vec<CollisionOutput>,
    summary: SummaryOutput,
}

#[derive(Serialize)]
struct CollisionOutput {
    r_value: String,
    repeats: Vec<RepeatOutput>,
}

#[derive(Serialize)]
struct RepeatOutput {
    txid: String,
    spends_txid: String,
}

#[derive(Serialize)]
struct SummaryOutput {
    blocks_scanned: u64,
    transactions_scanned: u64,
    signatures_extracted: u64,
    partial_scripts: u64,
    distinct_r_values: usize,
    reused_r_values: usize,
    scan_complete: bool,
}

fn build_report(
    collisions: &[Collision],
    correlator: &Correlator,
    stats: &ScanStats,
    scan_complete: bool,
) -> OutputReport {
    let collision_outputs = collisions
        .iter()
        .map(|c| CollisionOutput {
            r_value: c.r.clone(),
            repeats: c
                .repeats
                .iter()
                .map(|p| RepeatOutput {
                    txid: p.txid.clone(),
                    spends_txid: p.prev_txid.clone(),
                })
                .collect(),
        })
        .collect();

    OutputReport {
        collisions: collision_outputs,
        summary: SummaryOutput {
            blocks_scanned: stats.blocks,
            transactions_scanned: stats.transactions,
            signatures_extracted: stats.signatures,
            partial_scripts: stats.partial_scripts,
            distinct_r_values: correlator.distinct_r_values(),
            reused_r_values: collisions.len(),
            scan_complete,
        },
    }
}

fn format_output(report: &OutputReport, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let summary = &report.summary;
    let mut output = String::new();
    output.push_str(&format!(
        "Scanned {} blocks ({} transactions, {} signatures)\n\n",
        summary.blocks_scanned, summary.transactions_scanned, summary.signatures_extracted
    ));

    if report.collisions.is_empty() {
        output.push_str("No reused r-values found in this range.\n");
    } else {
        output.push_str(&format!(
            "Found {} reused r-values:\n\n",
            report.collisions.len()
        ));

        for (i, collision) in report.collisions.iter().enumerate() {
            output.push_str(&format!("Reuse #{}\n", i + 1));
            output.push_str(&format!("  R Value: {}\n", collision.r_value));
            output.push_str(&format!("  Repeats: {}\n", collision.repeats.len()));
            for repeat in &collision.repeats {
                output.push_str(&format!(
                    "    seen in: {} (spends {})\n",
                    repeat.txid, repeat.spends_txid
                ));
            }
            output.push('\n');
        }
    }

    Ok(output)
}

fn write_record_file(path: &Path, collisions: &[Collision]) -> Result<()> {
    let mut contents = String::new();
    for collision in collisions {
        contents.push_str(&format!("r={}\n", collision.r));
        for repeat in &collision.repeats {
            contents.push_str(&format!(
                "   seen in: {} (spends {})\n",
                repeat.txid, repeat.prev_txid
            ));
        }
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}
