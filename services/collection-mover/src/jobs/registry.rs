// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job registry
//!
//! Process-scoped table of job records. Reads (status queries, new
//! subscriptions) run concurrently; each record has exactly one writer, the
//! [`JobWriter`] handed out by [`JobRegistry::create`]. Every accepted update
//! is broadcast to the job's subscribers while the record lock is held, so a
//! subscriber that attaches between two updates sees a snapshot followed by
//! exactly the later events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use collection_mover_types::{
    CollectionId, JobId, JobRecord, JobStatus, MoveMode, ProgressEvent,
};

/// Shortest and longest pause between reaper passes.
const REAPER_MIN_INTERVAL: Duration = Duration::from_secs(1);
const REAPER_MAX_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid update for job {job_id}: {reason}")]
    InvalidTransition { job_id: JobId, reason: String },

    #[error("Job {0} has not finished")]
    NotTerminal(JobId),
}

/// Parameters of a job at acceptance time.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub mode: MoveMode,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
    pub companies: u64,
    pub chunks: u64,
}

struct SlotState {
    record: JobRecord,
    finished_at: Option<Instant>,
}

struct JobSlot {
    seq: u64,
    state: Mutex<SlotState>,
    events: broadcast::Sender<ProgressEvent>,
}

impl JobSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Registry of move jobs
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobSlot>>>,
    event_buffer: usize,
    next_seq: AtomicU64,
}

impl JobRegistry {
    /// Create an empty registry. `event_buffer` bounds how many undelivered
    /// events a subscriber may fall behind before it starts losing the
    /// oldest ones.
    pub fn new(event_buffer: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            event_buffer: event_buffer.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    fn slot(&self, job_id: &str) -> Result<Arc<JobSlot>, RegistryError> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned()
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))
    }

    fn slots(&self) -> Vec<Arc<JobSlot>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Allocate a `pending` record and return its only writer.
    pub fn create(self: &Arc<Self>, job: NewJob) -> JobWriter {
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = JobRecord {
            job_id: job_id.clone(),
            mode: job.mode,
            source_collection: job.source_collection,
            target_collection: job.target_collection,
            companies: job.companies,
            chunks: job.chunks,
            chunks_processed: 0,
            status: JobStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let (events, _) = broadcast::channel(self.event_buffer);
        let slot = JobSlot {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SlotState {
                record,
                finished_at: None,
            }),
            events,
        };

        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.clone(), Arc::new(slot));

        tracing::info!(
            job_id = %job_id,
            mode = %job.mode,
            chunks = job.chunks,
            "Job created"
        );

        JobWriter {
            registry: Arc::clone(self),
            job_id,
            finished: false,
        }
    }

    pub fn get(&self, job_id: &str) -> Result<JobRecord, RegistryError> {
        Ok(self.slot(job_id)?.lock().record.clone())
    }

    /// All retained jobs, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut slots = self.slots();
        slots.sort_by(|a, b| b.seq.cmp(&a.seq));
        slots.iter().map(|s| s.lock().record.clone()).collect()
    }

    /// Snapshot a job and subscribe to its later updates in one step.
    pub fn attach(
        &self,
        job_id: &str,
    ) -> Result<(JobRecord, broadcast::Receiver<ProgressEvent>), RegistryError> {
        let slot = self.slot(job_id)?;
        let state = slot.lock();
        Ok((state.record.clone(), slot.events.subscribe()))
    }

    /// Apply `mutate` to a job's record and broadcast the result.
    ///
    /// Only the job's runner calls this (through its [`JobWriter`]). A
    /// mutation that breaks the record's invariants is rolled back and
    /// reported as [`RegistryError::InvalidTransition`].
    pub fn update<F>(&self, job_id: &str, mutate: F) -> Result<JobRecord, RegistryError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let slot = self.slot(job_id)?;
        let mut state = slot.lock();
        let before = state.record.clone();

        mutate(&mut state.record);
        if let Err(reason) = check_update(&before, &state.record) {
            state.record = before;
            return Err(RegistryError::InvalidTransition {
                job_id: job_id.to_string(),
                reason,
            });
        }

        state.record.updated_at = Utc::now();
        if state.record.status.is_terminal() {
            state.finished_at = Some(Instant::now());
        }
        // No receivers is fine; late subscribers start from a snapshot.
        let _ = slot.events.send(state.record.progress_event());

        Ok(state.record.clone())
    }

    /// Remove a finished job. Subscribers that already hold the terminal
    /// event are unaffected.
    pub fn prune(&self, job_id: &str) -> Result<JobRecord, RegistryError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let slot = jobs
            .get(job_id)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;
        let record = slot.lock().record.clone();
        if !record.status.is_terminal() {
            return Err(RegistryError::NotTerminal(job_id.to_string()));
        }
        jobs.remove(job_id);
        tracing::info!(job_id = %job_id, status = %record.status, "Job pruned");
        Ok(record)
    }

    /// Prune every job that finished at least `retention` ago.
    pub fn prune_expired(&self, retention: Duration) -> usize {
        let expired: Vec<JobId> = {
            let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
            jobs.iter()
                .filter(|(_, slot)| {
                    slot.lock()
                        .finished_at
                        .is_some_and(|at| at.elapsed() >= retention)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        expired
            .iter()
            .filter(|id| self.prune(id).is_ok())
            .count()
    }

    /// Mark every unfinished job `failed` with `detail`.
    ///
    /// Used at shutdown so open status streams end with a terminal event
    /// instead of hanging.
    pub fn fail_unfinished(&self, detail: &str) -> usize {
        let mut failed = 0;
        for slot in self.slots() {
            let job_id = slot.lock().record.job_id.clone();
            let result = self.update(&job_id, |record| {
                if !record.status.is_terminal() {
                    record.status = JobStatus::Failed;
                    record.error = Some(detail.to_string());
                }
            });
            if result.is_ok() {
                tracing::warn!(job_id = %job_id, detail, "Job failed at shutdown");
                failed += 1;
            }
        }
        failed
    }

    /// Periodically prune expired jobs.
    ///
    /// `retention` is read on every pass so a config reload takes effect
    /// without a restart.
    pub fn spawn_reaper<F>(self: &Arc<Self>, retention: F) -> JoinHandle<()>
    where
        F: Fn() -> Duration + Send + 'static,
    {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let window = retention();
                tokio::time::sleep(window.clamp(REAPER_MIN_INTERVAL, REAPER_MAX_INTERVAL)).await;

                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let pruned = registry.prune_expired(window);
                if pruned > 0 {
                    tracing::debug!(pruned, "Reaper pruned finished jobs");
                }
            }
        })
    }
}

fn check_update(before: &JobRecord, after: &JobRecord) -> Result<(), String> {
    if before.status.is_terminal() {
        return Err(format!("job is already {}", before.status));
    }
    if after.status != before.status && !before.status.can_transition_to(after.status) {
        return Err(format!("{} -> {} is not allowed", before.status, after.status));
    }
    if after.job_id != before.job_id
        || after.chunks != before.chunks
        || after.source_collection != before.source_collection
        || after.target_collection != before.target_collection
    {
        return Err("job identity is immutable".to_string());
    }
    if after.chunks_processed < before.chunks_processed {
        return Err("chunks_processed went backwards".to_string());
    }
    if after.chunks_processed > after.chunks {
        return Err(format!(
            "chunks_processed {} exceeds chunks {}",
            after.chunks_processed, after.chunks
        ));
    }
    if after.status == JobStatus::Completed && after.chunks_processed != after.chunks {
        return Err("completed with unprocessed chunks".to_string());
    }
    Ok(())
}

/// Write handle for one job.
///
/// Not `Clone`: holding it is what makes the runner the record's only
/// writer. Dropping an unfinished writer fails the job so no record stays
/// `in_progress` forever.
pub struct JobWriter {
    registry: Arc<JobRegistry>,
    job_id: JobId,
    finished: bool,
}

impl JobWriter {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn record(&self) -> Result<JobRecord, RegistryError> {
        self.registry.get(&self.job_id)
    }

    /// `pending -> in_progress`
    pub fn start(&mut self) -> Result<JobRecord, RegistryError> {
        tracing::info!(job_id = %self.job_id, "Job started");
        self.registry.update(&self.job_id, |record| {
            record.status = JobStatus::InProgress;
        })
    }

    /// Count one more chunk as moved.
    pub fn chunk_done(&mut self) -> Result<JobRecord, RegistryError> {
        self.registry.update(&self.job_id, |record| {
            record.chunks_processed += 1;
        })
    }

    pub fn complete(mut self) -> Result<JobRecord, RegistryError> {
        self.finished = true;
        let record = self.registry.update(&self.job_id, |record| {
            record.status = JobStatus::Completed;
            record.chunks_processed = record.chunks;
        })?;
        tracing::info!(job_id = %self.job_id, chunks = record.chunks, "Job completed");
        Ok(record)
    }

    pub fn fail(mut self, detail: impl Into<String>) -> Result<JobRecord, RegistryError> {
        self.finished = true;
        let detail = detail.into();
        tracing::error!(job_id = %self.job_id, error = %detail, "Job failed");
        self.registry.update(&self.job_id, |record| {
            record.status = JobStatus::Failed;
            record.error = Some(detail);
        })
    }
}

impl Drop for JobWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let result = self.registry.update(&self.job_id, |record| {
            record.status = JobStatus::Failed;
            record.error = Some("job runner stopped before the job finished".to_string());
        });
        if result.is_ok() {
            tracing::warn!(job_id = %self.job_id, "Job writer dropped, job marked failed");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    fn new_job(chunks: u64) -> NewJob {
        NewJob {
            mode: MoveMode::All,
            source_collection: "src".to_string(),
            target_collection: "dst".to_string(),
            companies: chunks * 10,
            chunks,
        }
    }

    #[test]
    fn create_starts_pending() {
        let registry = Arc::new(JobRegistry::new(4));
        let writer = registry.create(new_job(3));

        let record = registry.get(writer.job_id()).expect("get");
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.chunks, 3);
        assert_eq!(record.chunks_processed, 0);
        assert_eq!(record.mode, MoveMode::All);
    }

    #[test]
    fn writer_walks_the_lifecycle() {
        let registry = Arc::new(JobRegistry::new(4));
        let mut writer = registry.create(new_job(2));
        let job_id = writer.job_id().to_string();

        writer.start().expect("start");
        writer.chunk_done().expect("chunk 1");
        writer.chunk_done().expect("chunk 2");
        let record = writer.complete().expect("complete");

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.chunks_processed, 2);
        assert_eq!(registry.get(&job_id).expect("get"), record);
    }

    #[test]
    fn rejected_update_is_rolled_back() {
        let registry = Arc::new(JobRegistry::new(4));
        let mut writer = registry.create(new_job(1));
        writer.start().expect("start");
        writer.chunk_done().expect("chunk");

        let err = writer.chunk_done().expect_err("beyond chunk count");
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(
            registry.get(writer.job_id()).expect("get").chunks_processed,
            1
        );
    }

    #[test]
    fn terminal_jobs_do_not_change() {
        let registry = Arc::new(JobRegistry::new(4));
        let writer = registry.create(new_job(1));
        let job_id = writer.job_id().to_string();
        writer.fail("boom").expect("fail");

        let err = registry
            .update(&job_id, |r| r.status = JobStatus::InProgress)
            .expect_err("terminal");
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(
            registry.get(&job_id).expect("get").error.as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn dropped_writer_fails_job() {
        let registry = Arc::new(JobRegistry::new(4));
        let mut writer = registry.create(new_job(2));
        let job_id = writer.job_id().to_string();
        writer.start().expect("start");
        drop(writer);

        let record = registry.get(&job_id).expect("get");
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.is_some());
    }

    #[test]
    fn prune_requires_terminal_state() {
        let registry = Arc::new(JobRegistry::new(4));
        let mut writer = registry.create(new_job(1));
        let job_id = writer.job_id().to_string();
        writer.start().expect("start");

        assert_eq!(
            registry.prune(&job_id),
            Err(RegistryError::NotTerminal(job_id.clone()))
        );

        writer.chunk_done().expect("chunk");
        writer.complete().expect("complete");
        registry.prune(&job_id).expect("prune");
        assert_eq!(
            registry.get(&job_id),
            Err(RegistryError::JobNotFound(job_id))
        );
    }

    #[test]
    fn prune_expired_only_removes_finished_jobs() {
        let registry = Arc::new(JobRegistry::new(4));
        let done = registry.create(new_job(0));
        let done_id = done.job_id().to_string();
        done.complete().expect("complete");
        let mut running = registry.create(new_job(1));
        running.start().expect("start");

        assert_eq!(registry.prune_expired(Duration::from_secs(3600)), 0);
        assert_eq!(registry.prune_expired(Duration::ZERO), 1);
        assert!(registry.get(&done_id).is_err());
        assert!(registry.get(running.job_id()).is_ok());
    }

    #[test]
    fn list_is_newest_first() {
        let registry = Arc::new(JobRegistry::new(4));
        let first = registry.create(new_job(1));
        let second = registry.create(new_job(1));

        let ids: Vec<String> = registry.list().into_iter().map(|r| r.job_id).collect();
        assert_eq!(
            ids,
            vec![second.job_id().to_string(), first.job_id().to_string()]
        );
    }

    #[test]
    fn fail_unfinished_notifies_subscribers() {
        let registry = Arc::new(JobRegistry::new(4));
        let mut writer = registry.create(new_job(3));
        writer.start().expect("start");
        let (snapshot, mut rx) = registry.attach(writer.job_id()).expect("attach");
        assert_eq!(snapshot.status, JobStatus::InProgress);

        assert_eq!(registry.fail_unfinished("server shutting down"), 1);

        let event = rx.try_recv().expect("terminal event");
        assert_eq!(event.status, JobStatus::Failed);
        assert_eq!(event.error.as_deref(), Some("server shutting down"));
        assert_eq!(registry.fail_unfinished("again"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_prunes_after_retention() {
        let registry = Arc::new(JobRegistry::new(4));
        let writer = registry.create(new_job(0));
        let job_id = writer.job_id().to_string();
        writer.complete().expect("complete");

        let reaper = registry.spawn_reaper(|| Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(registry.get(&job_id).is_err());
        reaper.abort();
    }
}
