use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::Parser;

use kline_cli::cli::{Cli, Commands};
use kline_cli::fetch::{KlineFetcher, INTERVAL};
use kline_cli::jobs::{load_jobs, Job};
use kline_cli::records::{artifact_name, KlineSeries};
use kline_cli::series::{AssemblyOutcome, SeriesAssembler};
use kline_cli::utils::utc_date_ms;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if !Path::new(&cli.output_dir).exists() {
        fs::create_dir_all(&cli.output_dir)?;
    }

    let jobs = match &cli.command {
        Commands::Run { jobs } => load_jobs(jobs)?,
        Commands::Fetch { symbol, start, end } => vec![Job {
            symbol: symbol.clone(),
            start_date: start.clone(),
            end_date: end.clone(),
        }],
    };

    if jobs.is_empty() {
        println!("No jobs to run; add entries to the jobs file and re-run.");
        return Ok(());
    }

    let fetcher = KlineFetcher::new()?;

    // One symbol at a time; a failed job never takes the batch down with it.
    for job in &jobs {
        if let Err(e) = process_job(&fetcher, job, &cli.output_dir) {
            println!("Error processing {}: {}", job.symbol, e);
        }
    }

    Ok(())
}

fn process_job(fetcher: &KlineFetcher, job: &Job, output_dir: &str) -> Result<()> {
    let start_ms = utc_date_ms(&job.start_date)?;
    let end_ms = utc_date_ms(&job.end_date)?;
    if start_ms >= end_ms {
        anyhow::bail!("Empty date range {} to {}", job.start_date, job.end_date);
    }

    let output_file = Path::new(output_dir).join(artifact_name(
        &job.symbol,
        INTERVAL,
        &job.start_date,
        &job.end_date,
    ));
    println!(
        "Processing {}: {} to {}  Output: {}",
        job.symbol,
        job.start_date,
        job.end_date,
        output_file.display()
    );

    let mut assembler = SeriesAssembler::new(&job.symbol, start_ms, end_ms);
    assembler.run(fetcher);

    match assembler.finish() {
        AssemblyOutcome::Complete(rows) => {
            let series = KlineSeries::new(&job.symbol, rows);
            series.save_to_parquet(&output_file)?;
            println!("   Data saved to {}", output_file.display());
        }
        AssemblyOutcome::Partial(rows) => {
            let series = KlineSeries::new(&job.symbol, rows);
            series.save_to_parquet(&output_file)?;
            println!(
                "   Fetch for {} stopped early; saved {} rows to {}",
                series.symbol,
                series.len(),
                output_file.display()
            );
        }
        AssemblyOutcome::NoData => {
            println!(
                "   No data fetched for {} between {} and {}",
                job.symbol, job.start_date, job.end_date
            );
        }
    }

    Ok(())
}
