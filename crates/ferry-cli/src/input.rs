use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use ferry_core::Job;

/// Names of the two columns a job list must provide.
#[derive(Debug, Clone)]
pub struct Columns {
    pub url: String,
    pub name: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            url: "url".to_string(),
            name: "file_name".to_string(),
        }
    }
}

/// Read the job list from a CSV file with a header row.
pub fn load_jobs(path: &Path, columns: &Columns) -> Result<Vec<Job>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open job list: {}", path.display()))?;
    read_jobs(file, columns).with_context(|| format!("Invalid job list: {}", path.display()))
}

pub fn read_jobs<R: Read>(reader: R, columns: &Columns) -> Result<Vec<Job>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h == name).with_context(|| {
            let found: Vec<_> = headers.iter().collect();
            format!("missing column '{name}' (found: {})", found.join(", "))
        })
    };
    let url_idx = column(&columns.url)?;
    let name_idx = column(&columns.name)?;

    let mut jobs = Vec::new();
    let mut seen = HashSet::new();
    for (i, record) in reader.records().enumerate() {
        // Data rows are numbered from 1, after the header.
        let row = i + 1;
        let record = record.with_context(|| format!("row {row}: malformed CSV"))?;
        let url = record.get(url_idx).unwrap_or_default();
        let name = record.get(name_idx).unwrap_or_default();

        if url.is_empty() && name.is_empty() {
            continue;
        }
        if url.is_empty() || name.is_empty() {
            bail!("row {row}: both '{}' and '{}' are required", columns.url, columns.name);
        }

        let job = Job::new(url, name, row)?;
        if !seen.insert(job.output_name().to_string()) {
            tracing::warn!(
                row,
                output_name = job.output_name(),
                "Duplicate output name; the later download will overwrite the earlier one"
            );
        }
        jobs.push(job);
    }

    Ok(jobs)
}
