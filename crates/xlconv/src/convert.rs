use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Table;
use tracing::{info, warn};
use xlconv_core::source::check_media_type;
use xlconv_core::{DiskFile, FileSource, ItemStatus, OrchestratorHandle};

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Spreadsheets to convert (.xls or .xlsx)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Directory the converted workbooks are written to
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRow {
    pub name: String,
    pub status: ItemStatus,
    pub detail: String,
}

/// Outcome of one batch: a row per converted or failed file, plus the inputs
/// that never became items.
#[derive(Debug, Default)]
pub struct ConvertReport {
    pub rows: Vec<ConvertRow>,
    pub skipped: Vec<(PathBuf, String)>,
}

impl ConvertReport {
    pub fn failed(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.status == ItemStatus::Error)
            .count()
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(vec!["File", "Status", "Detail"]);
        for row in &self.rows {
            table.add_row(vec![
                row.name.clone(),
                row.status.to_string(),
                row.detail.clone(),
            ]);
        }
        table
    }
}

pub async fn run(handle: &OrchestratorHandle, args: &ConvertArgs) -> Result<ConvertReport> {
    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let mut report = ConvertReport::default();
    let mut files: Vec<Box<dyn FileSource>> = Vec::new();
    for path in &args.files {
        match DiskFile::open(path).await {
            Ok(file) => match check_media_type(&file) {
                Ok(()) => files.push(Box::new(file)),
                Err(err) => report.skipped.push((path.clone(), err.to_string())),
            },
            Err(err) => report.skipped.push((path.clone(), err.to_string())),
        }
    }
    for (path, reason) in &report.skipped {
        warn!(path = %path.display(), %reason, "skipping input");
    }

    let ids = handle.submit(files).await?;
    info!(count = ids.len(), "submitted files for conversion");
    let snapshot = handle.settled().await?;

    let mut written = HashSet::new();
    for id in &ids {
        let Some(item) = snapshot.iter().find(|item| &item.id == id) else {
            continue;
        };
        let row = match item.status() {
            ItemStatus::Completed => {
                let download = handle.download(id).await?;
                let target = unique_target(&args.out_dir, &download.file_name, &mut written);
                write_output(&target, &download.bytes).await?;
                ConvertRow {
                    name: item.name.clone(),
                    status: ItemStatus::Completed,
                    detail: target.display().to_string(),
                }
            }
            status => {
                handle.remove(id).await?;
                ConvertRow {
                    name: item.name.clone(),
                    status,
                    detail: item.error().unwrap_or_default().to_string(),
                }
            }
        };
        report.rows.push(row);
    }

    Ok(report)
}

/// Picks an output path no earlier file of this batch has used, adding `-n`
/// before the extension when converted names collide.
fn unique_target(out_dir: &Path, file_name: &str, written: &mut HashSet<PathBuf>) -> PathBuf {
    let (stem, extension) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
    let mut target = out_dir.join(file_name);
    let mut n = 1;
    while written.contains(&target) {
        let candidate = if extension.is_empty() {
            format!("{stem}-{n}")
        } else {
            format!("{stem}-{n}.{extension}")
        };
        target = out_dir.join(candidate);
        n += 1;
    }
    written.insert(target.clone());
    target
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote converted workbook");
    Ok(())
}
