use std::path::Path;

use serde::Deserialize;

use crate::error::{Context, Result};

/// One batch entry: fetch `symbol` over `[start_date, end_date)`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
}

const JOBS_HEADER: [&str; 3] = ["symbol", "start_date", "end_date"];

/// Load the batch job list. A missing file is not an error: the tool
/// ships with an empty list, so a header-only template is written for the
/// user to fill in and an empty list is returned.
pub fn load_jobs(file_path: &str) -> Result<Vec<Job>> {
    if !Path::new(file_path).exists() {
        if let Ok(mut writer) = csv::Writer::from_path(file_path) {
            let _ = writer.write_record(JOBS_HEADER);
            let _ = writer.flush();
            println!("Created empty jobs file template: {}", file_path);
        } else {
            println!("No jobs file at {} (couldn't create a template)", file_path);
        }
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(file_path).context("Failed to open jobs file")?;

    let mut jobs = Vec::new();
    for result in reader.deserialize() {
        let job: Job = result.context("Failed to read jobs record")?;
        jobs.push(job);
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_jobs_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        fs::write(
            &path,
            "symbol,start_date,end_date\nBTCUSDT,2024-01-01,2024-02-01\nETHUSDT,2023-05-01,2023-06-01\n",
        )
        .unwrap();

        let jobs = load_jobs(path.to_str().unwrap()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].symbol, "BTCUSDT");
        assert_eq!(jobs[1].start_date, "2023-05-01");
        assert_eq!(jobs[1].end_date, "2023-06-01");
    }

    #[test]
    fn missing_file_yields_empty_list_and_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");

        let jobs = load_jobs(path.to_str().unwrap()).unwrap();

        assert!(jobs.is_empty());
        let template = fs::read_to_string(&path).unwrap();
        assert!(template.starts_with("symbol,start_date,end_date"));
    }
}
