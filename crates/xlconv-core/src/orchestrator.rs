//! Upload orchestration: one state owner, one worker, channels in between.
//!
//! The state owner is the only task that mutates [`UploadItem`]s. It reacts to
//! commands from [`OrchestratorHandle`]s and to events from the worker, and
//! publishes every change as a fresh [`Snapshot`] so readers always see whole
//! items.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::{Result, UploadError};
use crate::source::{check_media_type, FileSource};
use crate::transform::{checkpoints, TransformEngine};
use crate::upload::{Download, ItemId, ItemState, UploadItem};
use crate::worker::{run_worker, Job, WorkerEvent};

/// Message shown for failures that carry no text of their own.
pub const UNKNOWN_ERROR: &str = "Unknown error";

pub type Snapshot = Arc<[UploadItem]>;

enum Command {
    Submit {
        files: Vec<Box<dyn FileSource>>,
        reply: oneshot::Sender<Vec<ItemId>>,
    },
    Remove {
        id: ItemId,
        reply: oneshot::Sender<bool>,
    },
    Download {
        id: ItemId,
        reply: oneshot::Sender<Result<Download>>,
    },
}

pub struct Orchestrator;

impl Orchestrator {
    /// Starts the state owner and worker tasks on the current tokio runtime.
    /// Both stop once every handle has been dropped.
    pub fn spawn(engine: TransformEngine) -> OrchestratorHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::from(Vec::new()));

        tokio::spawn(run_worker(Arc::new(engine), job_rx, event_tx));

        let owner = StateOwner {
            items: Vec::new(),
            issued: HashSet::new(),
            snapshots: snapshot_tx,
            jobs: job_tx,
        };
        tokio::spawn(owner.run(command_rx, event_rx));

        OrchestratorHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }
}

#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl OrchestratorHandle {
    /// Queues every file with an accepted media type, in order, and returns
    /// the ids of the items created. Other files are logged and dropped.
    pub async fn submit(&self, files: Vec<Box<dyn FileSource>>) -> Result<Vec<ItemId>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit { files, reply })?;
        response.await.map_err(|_| UploadError::Closed)
    }

    /// Removes an item in any state. Returns whether it existed.
    pub async fn remove(&self, id: &ItemId) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Remove {
            id: id.clone(),
            reply,
        })?;
        response.await.map_err(|_| UploadError::Closed)
    }

    /// Hands out the converted file of a completed item and removes the item.
    pub async fn download(&self, id: &ItemId) -> Result<Download> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Download {
            id: id.clone(),
            reply,
        })?;
        response.await.map_err(|_| UploadError::Closed)?
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Waits until no item is pending or processing.
    pub async fn settled(&self) -> Result<Snapshot> {
        let mut snapshots = self.subscribe();
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.iter().all(UploadItem::is_terminal) {
                return Ok(snapshot);
            }
            snapshots.changed().await.map_err(|_| UploadError::Closed)?;
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| UploadError::Closed)
    }
}

struct StateOwner {
    items: Vec<UploadItem>,
    /// Ids of live items plus removed ones the worker still owes a terminal
    /// event. Reusing either could route stale events to a new item.
    issued: HashSet<ItemId>,
    snapshots: watch::Sender<Snapshot>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl StateOwner {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(event) = events.recv() => self.apply(event),
            }
        }
        debug!("upload orchestrator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit { files, reply } => {
                let _ = reply.send(self.submit(files));
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove(&id));
            }
            Command::Download { id, reply } => {
                let _ = reply.send(self.download(&id));
            }
        }
    }

    fn submit(&mut self, files: Vec<Box<dyn FileSource>>) -> Vec<ItemId> {
        let mut jobs = Vec::new();

        for file in files {
            if let Err(err) = check_media_type(file.as_ref()) {
                warn!(name = file.name(), media_type = file.media_type(), "{err}");
                continue;
            }

            let id = self.next_id(file.name());
            info!(id = %id, name = file.name(), size = file.size(), "queued upload");
            self.items.push(UploadItem::pending(id.clone(), file.as_ref()));
            jobs.push(Job { id, source: file });
        }

        let accepted: Vec<ItemId> = jobs.iter().map(|job| job.id.clone()).collect();
        if accepted.is_empty() {
            return accepted;
        }

        self.publish();
        for job in jobs {
            let id = job.id.clone();
            if self.jobs.send(job).is_err() {
                self.update(&id, |item| {
                    item.state = ItemState::Error {
                        message: UploadError::Closed.to_string(),
                    };
                });
            }
        }
        accepted
    }

    fn remove(&mut self, id: &ItemId) -> bool {
        let Some(index) = self.items.iter().position(|item| &item.id == id) else {
            return false;
        };
        let item = self.items.remove(index);
        if item.is_terminal() {
            self.issued.remove(id);
        }
        info!(id = %id, "removed upload");
        self.publish();
        true
    }

    fn download(&mut self, id: &ItemId) -> Result<Download> {
        let index = self
            .items
            .iter()
            .position(|item| &item.id == id)
            .ok_or_else(|| UploadError::NotFound(id.clone()))?;

        let download = match &self.items[index].state {
            ItemState::Completed { result } => {
                Download::from_completed(&self.items[index].name, result.clone())
            }
            other => {
                return Err(UploadError::NotReady {
                    id: id.clone(),
                    status: other.status(),
                })
            }
        };

        self.items.remove(index);
        self.issued.remove(id);
        info!(id = %id, file_name = %download.file_name, "downloaded upload");
        self.publish();
        Ok(download)
    }

    fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Started(id) => {
                self.update(&id, |item| {
                    item.state = ItemState::Processing;
                    item.progress = checkpoints::STARTED;
                });
                info!(id = %id, "processing upload");
            }
            WorkerEvent::Progress(id, percent) => {
                self.update(&id, |item| {
                    if matches!(item.state, ItemState::Processing) {
                        item.progress = percent.min(checkpoints::DONE);
                    }
                });
                debug!(id = %id, percent, "upload progress");
            }
            WorkerEvent::Completed(id, result) => {
                self.release_if_removed(&id);
                let size = result.len();
                self.update(&id, |item| {
                    item.state = ItemState::Completed { result };
                    item.progress = checkpoints::DONE;
                });
                info!(id = %id, size, "upload converted");
            }
            WorkerEvent::Failed(id, message) => {
                self.release_if_removed(&id);
                error!(id = %id, "upload failed: {message}");
                let message = if message.trim().is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    message
                };
                self.update(&id, |item| item.state = ItemState::Error { message });
            }
        }
    }

    /// Mutates one item and republishes. Events for removed items are dropped.
    fn update(&mut self, id: &ItemId, change: impl FnOnce(&mut UploadItem)) {
        let Some(item) = self.items.iter_mut().find(|item| &item.id == id) else {
            return;
        };
        change(item);
        self.publish();
    }

    /// Forgets the id of an item that was removed before its job finished.
    fn release_if_removed(&mut self, id: &ItemId) {
        if !self.items.iter().any(|item| &item.id == id) {
            self.issued.remove(id);
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Snapshot::from(self.items.clone()));
    }

    fn next_id(&mut self, name: &str) -> ItemId {
        let base = ItemId::derive(name, Utc::now());
        let mut id = base.clone();
        let mut n = 1;
        while self.issued.contains(&id) {
            id = base.with_suffix(n);
            n += 1;
        }
        self.issued.insert(id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryFile;
    use crate::upload::ItemStatus;
    use xlconv_parser::XLSX_MEDIA_TYPE;

    fn owner() -> (StateOwner, mpsc::UnboundedReceiver<Job>) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(Snapshot::from(Vec::new()));
        let owner = StateOwner {
            items: Vec::new(),
            issued: HashSet::new(),
            snapshots: snapshot_tx,
            jobs: job_tx,
        };
        (owner, job_rx)
    }

    fn file(name: &str) -> Box<dyn FileSource> {
        Box::new(MemoryFile::new(name, XLSX_MEDIA_TYPE, &b"bytes"[..]))
    }

    #[test]
    fn accepted_files_are_queued_in_order() {
        let (mut owner, mut jobs) = owner();

        let ids = owner.submit(vec![file("a.xlsx"), file("b.xlsx")]);

        assert_eq!(owner.items.len(), 2);
        assert!(owner.items.iter().all(|item| item.status() == ItemStatus::Pending));
        assert!(owner.items.iter().all(|item| item.progress == 0));
        assert_eq!(jobs.try_recv().map(|job| job.id).ok(), Some(ids[0].clone()));
        assert_eq!(jobs.try_recv().map(|job| job.id).ok(), Some(ids[1].clone()));
    }

    #[test]
    fn events_walk_an_item_through_its_states() {
        let (mut owner, _jobs) = owner();
        let id = owner.submit(vec![file("a.xlsx")]).remove(0);

        owner.apply(WorkerEvent::Started(id.clone()));
        assert_eq!(owner.items[0].status(), ItemStatus::Processing);
        assert_eq!(owner.items[0].progress, checkpoints::STARTED);

        owner.apply(WorkerEvent::Progress(id.clone(), checkpoints::DECODED));
        assert_eq!(owner.items[0].progress, checkpoints::DECODED);

        owner.apply(WorkerEvent::Completed(id, bytes::Bytes::from_static(b"out")));
        assert_eq!(owner.items[0].status(), ItemStatus::Completed);
        assert_eq!(owner.items[0].progress, checkpoints::DONE);
        assert_eq!(owner.snapshots.borrow()[0].status(), ItemStatus::Completed);
    }

    #[test]
    fn blank_failure_message_uses_generic_text() {
        let (mut owner, _jobs) = owner();
        let id = owner.submit(vec![file("a.xlsx")]).remove(0);

        owner.apply(WorkerEvent::Started(id.clone()));
        owner.apply(WorkerEvent::Failed(id, "  ".to_string()));

        assert_eq!(owner.items[0].error(), Some(UNKNOWN_ERROR));
    }

    #[test]
    fn events_for_removed_items_are_ignored() {
        let (mut owner, _jobs) = owner();
        let id = owner.submit(vec![file("a.xlsx")]).remove(0);
        assert!(owner.remove(&id));

        owner.apply(WorkerEvent::Started(id.clone()));
        owner.apply(WorkerEvent::Completed(id, bytes::Bytes::new()));

        assert!(owner.items.is_empty());
        assert!(owner.snapshots.borrow().is_empty());
    }

    #[test]
    fn finished_items_release_their_ids() {
        let (mut owner, mut jobs) = owner();

        for _ in 0..1000 {
            let id = owner.submit(vec![file("cycle.xlsx")]).remove(0);
            let _ = jobs.try_recv();
            owner.apply(WorkerEvent::Started(id.clone()));
            owner.apply(WorkerEvent::Completed(id.clone(), bytes::Bytes::from_static(b"out")));
            assert!(owner.download(&id).is_ok());
        }

        assert!(owner.items.is_empty());
        assert!(owner.issued.is_empty());
    }

    #[test]
    fn removed_pending_item_keeps_its_id_until_the_worker_reports() {
        let (mut owner, _jobs) = owner();
        let id = owner.submit(vec![file("a.xlsx")]).remove(0);
        assert!(owner.remove(&id));
        assert!(owner.issued.contains(&id));

        owner.apply(WorkerEvent::Started(id.clone()));
        owner.apply(WorkerEvent::Failed(id.clone(), "late".to_string()));
        assert!(owner.issued.is_empty());

        let failed = owner.submit(vec![file("b.xlsx")]).remove(0);
        owner.apply(WorkerEvent::Failed(failed.clone(), "bad".to_string()));
        assert!(owner.remove(&failed));
        assert!(owner.issued.is_empty());
    }

    #[test]
    fn ids_are_never_reused() {
        let (mut owner, _jobs) = owner();
        let first = owner.next_id("same.xlsx");
        let second = owner.next_id("same.xlsx");
        let third = owner.next_id("same.xlsx");

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
    }
}
