use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task;

use crate::error::TransformError;
use crate::source::FileSource;
use crate::transform::TransformEngine;
use crate::upload::ItemId;

pub(crate) struct Job {
    pub id: ItemId,
    pub source: Box<dyn FileSource>,
}

/// Everything the worker reports back to the state owner.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Started(ItemId),
    Progress(ItemId, u8),
    Completed(ItemId, Bytes),
    Failed(ItemId, String),
}

/// Processes jobs strictly one after another. The next job is not taken until
/// the previous one has reported `Completed` or `Failed`.
pub(crate) async fn run_worker(
    engine: Arc<TransformEngine>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    while let Some(job) = jobs.recv().await {
        let Job { id, source } = job;
        if events.send(WorkerEvent::Started(id.clone())).is_err() {
            break;
        }

        let outcome = match process(&engine, &id, source.as_ref(), &events).await {
            Ok(result) => WorkerEvent::Completed(id, result),
            Err(err) => WorkerEvent::Failed(id, err.to_string()),
        };
        if events.send(outcome).is_err() {
            break;
        }
    }
}

async fn process(
    engine: &Arc<TransformEngine>,
    id: &ItemId,
    source: &dyn FileSource,
    events: &mpsc::UnboundedSender<WorkerEvent>,
) -> Result<Bytes, TransformError> {
    let raw = source
        .read_bytes()
        .await
        .map_err(|source_err| TransformError::Read {
            name: source.name().to_string(),
            source: source_err,
        })?;

    let engine = Arc::clone(engine);
    let progress_id = id.clone();
    let progress_events = events.clone();
    let output = task::spawn_blocking(move || {
        engine.transform(&raw, |percent| {
            let _ = progress_events.send(WorkerEvent::Progress(progress_id.clone(), percent));
        })
    })
    .await
    .map_err(|err| TransformError::Task(err.to_string()))??;

    Ok(Bytes::from(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryFile;
    use rust_xlsxwriter::Workbook;
    use xlconv_parser::XLSX_MEDIA_TYPE;

    fn workbook_bytes(value: &str) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "APNSEQ").unwrap();
        sheet.write_string(1, 0, value).unwrap();
        workbook.save_to_buffer().unwrap()
    }

    async fn run_jobs(files: Vec<MemoryFile>) -> Vec<WorkerEvent> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        for (index, file) in files.into_iter().enumerate() {
            job_tx
                .send(Job {
                    id: ItemId::from(format!("item-{index}")),
                    source: Box::new(file),
                })
                .unwrap_or_else(|_| panic!("worker queue closed"));
        }
        drop(job_tx);

        run_worker(Arc::new(TransformEngine::default()), job_rx, event_tx).await;

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn jobs_never_overlap() {
        let files = vec![
            MemoryFile::new("a.xlsx", XLSX_MEDIA_TYPE, workbook_bytes("1")),
            MemoryFile::new("b.xlsx", XLSX_MEDIA_TYPE, b"not a workbook".to_vec()),
            MemoryFile::new("c.xlsx", XLSX_MEDIA_TYPE, workbook_bytes("3")),
        ];

        let events = run_jobs(files).await;

        let mut active: Option<ItemId> = None;
        let mut started = Vec::new();
        for event in &events {
            match event {
                WorkerEvent::Started(id) => {
                    assert!(active.is_none(), "{id} started while {active:?} was running");
                    active = Some(id.clone());
                    started.push(id.clone());
                }
                WorkerEvent::Progress(id, _) => assert_eq!(Some(id), active.as_ref()),
                WorkerEvent::Completed(id, _) | WorkerEvent::Failed(id, _) => {
                    assert_eq!(Some(id), active.as_ref());
                    active = None;
                }
            }
        }

        assert!(active.is_none());
        let order: Vec<_> = started.iter().map(ItemId::as_str).collect();
        assert_eq!(order, vec!["item-0", "item-1", "item-2"]);
    }

    #[tokio::test]
    async fn a_bad_file_does_not_stop_the_batch() {
        let files = vec![
            MemoryFile::new("bad.xlsx", XLSX_MEDIA_TYPE, b"PK\x03\x04garbage".to_vec()),
            MemoryFile::new("good.xlsx", XLSX_MEDIA_TYPE, workbook_bytes("9")),
        ];

        let events = run_jobs(files).await;

        let failed = events.iter().find_map(|event| match event {
            WorkerEvent::Failed(id, message) => Some((id.as_str(), message.clone())),
            _ => None,
        });
        let (failed_id, message) = failed.expect("bad file should fail");
        assert_eq!(failed_id, "item-0");
        assert!(!message.is_empty());

        assert!(events
            .iter()
            .any(|event| matches!(event, WorkerEvent::Completed(id, _) if id.as_str() == "item-1")));
    }

    #[tokio::test]
    async fn progress_is_monotonic_per_job() {
        let files = vec![MemoryFile::new("a.xlsx", XLSX_MEDIA_TYPE, workbook_bytes("1"))];

        let events = run_jobs(files).await;

        let progress: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                WorkerEvent::Progress(_, percent) => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![30, 50, 70, 90, 100]);
    }
}
