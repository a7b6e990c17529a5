// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Client-side tracking of running move jobs.
//!
//! Each tracked job gets one status subscription. While it runs, progress is
//! reported only when the whole-percent value changes. Once a terminal event
//! arrives the subscription is dropped, the entry stays visible for a short
//! grace period, and then it is removed. A subscription is never retried: a
//! stream that ends early marks the job failed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use indexmap::IndexMap;
use indexmap::map::Entry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use collection_mover_types::{CollectionId, CollectionMetadata, JobId, JobStatus};

use crate::client::{ClientError, EventStream, MoverClient};

/// How long a finished job stays visible before it is removed.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Failure recorded when a status stream ends without a terminal event.
pub const STREAM_CLOSED_EARLY: &str = "status stream closed before the job finished";

/// Anything that can open a job's status stream.
#[async_trait]
pub trait JobStatusSource: Send + Sync + 'static {
    async fn subscribe(&self, job_id: &str) -> Result<EventStream, ClientError>;
}

#[async_trait]
impl JobStatusSource for MoverClient {
    async fn subscribe(&self, job_id: &str) -> Result<EventStream, ClientError> {
        self.subscribe_job_status(job_id).await
    }
}

/// Changes to the tracked set, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    Added { job_id: JobId, label: String },
    Progress { job_id: JobId, percent: u8 },
    Finished { job_id: JobId },
    Failed { job_id: JobId, error: String },
    Removed { job_id: JobId },
}

/// One tracked job as a front end would render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedJob {
    pub job_id: JobId,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
    pub label: String,
    pub running: bool,
    pub percent: u8,
    pub status: JobStatus,
    pub error: Option<String>,
}

enum Outcome {
    Finished,
    Failed(String),
}

struct Shared {
    jobs: Mutex<IndexMap<JobId, TrackedJob>>,
    names: Mutex<HashMap<CollectionId, String>>,
    events: mpsc::UnboundedSender<TrackerEvent>,
}

impl Shared {
    fn jobs(&self) -> MutexGuard<'_, IndexMap<JobId, TrackedJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TrackerEvent) {
        // Nobody listening is fine; the snapshot still reflects the change.
        let _ = self.events.send(event);
    }

    fn label(&self, source: &str, target: &str) -> String {
        let names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        let name = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());
        format!("{} ➡ {}", name(source), name(target))
    }

    /// Record a new whole-percent value; returns it if it changed.
    fn set_percent(&self, job_id: &str, percent: u8) -> Option<u8> {
        let mut jobs = self.jobs();
        let job = jobs.get_mut(job_id)?;
        job.status = JobStatus::InProgress;
        if job.percent == percent {
            return None;
        }
        job.percent = percent;
        Some(percent)
    }

    fn finish(&self, job_id: &str, outcome: &Outcome) {
        let mut jobs = self.jobs();
        if let Some(job) = jobs.get_mut(job_id) {
            job.running = false;
            match outcome {
                Outcome::Finished => {
                    job.status = JobStatus::Completed;
                    job.percent = 100;
                }
                Outcome::Failed(error) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(error.clone());
                }
            }
        }
    }
}

/// Follows jobs until they finish and reports what it sees.
pub struct JobTracker {
    source: Arc<dyn JobStatusSource>,
    shared: Arc<Shared>,
    grace: Duration,
}

impl JobTracker {
    pub fn new(source: Arc<dyn JobStatusSource>) -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        Self::with_grace(source, DEFAULT_GRACE)
    }

    pub fn with_grace(
        source: Arc<dyn JobStatusSource>,
        grace: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            source,
            shared: Arc::new(Shared {
                jobs: Mutex::new(IndexMap::new()),
                names: Mutex::new(HashMap::new()),
                events: tx,
            }),
            grace,
        };
        (tracker, rx)
    }

    /// Names used for labels; unknown collections are labelled by id.
    pub fn set_collection_names(&self, collections: impl IntoIterator<Item = CollectionMetadata>) {
        let mut names = self.shared.names.lock().unwrap_or_else(|e| e.into_inner());
        for collection in collections {
            names.insert(collection.id, collection.collection_name);
        }
    }

    /// Start following a freshly dispatched job.
    ///
    /// The returned handle resolves once the job has been removed again.
    /// Returns `None` if the job is already tracked; the existing entry and
    /// its subscription are left alone.
    pub fn track(
        &self,
        job_id: JobId,
        source_collection: CollectionId,
        target_collection: CollectionId,
    ) -> Option<JoinHandle<()>> {
        let label = self.shared.label(&source_collection, &target_collection);
        {
            let mut jobs = self.shared.jobs();
            match jobs.entry(job_id.clone()) {
                Entry::Occupied(_) => {
                    debug!(job_id = %job_id, "Job already tracked");
                    return None;
                }
                Entry::Vacant(slot) => {
                    slot.insert(TrackedJob {
                        job_id: job_id.clone(),
                        source_collection,
                        target_collection,
                        label: label.clone(),
                        running: true,
                        percent: 0,
                        status: JobStatus::Pending,
                        error: None,
                    });
                }
            }
        }
        self.shared.emit(TrackerEvent::Added {
            job_id: job_id.clone(),
            label,
        });

        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);
        let grace = self.grace;
        Some(tokio::spawn(async move {
            let outcome = follow(source.as_ref(), &shared, &job_id).await;
            shared.finish(&job_id, &outcome);
            match outcome {
                Outcome::Finished => {
                    debug!(job_id = %job_id, "Tracked job finished");
                    shared.emit(TrackerEvent::Finished {
                        job_id: job_id.clone(),
                    });
                }
                Outcome::Failed(error) => {
                    warn!(job_id = %job_id, error = %error, "Tracked job failed");
                    shared.emit(TrackerEvent::Failed {
                        job_id: job_id.clone(),
                        error,
                    });
                }
            }

            tokio::time::sleep(grace).await;
            shared.jobs().shift_remove(&job_id);
            shared.emit(TrackerEvent::Removed { job_id });
        }))
    }

    /// Tracked jobs in the order they were added.
    pub fn snapshot(&self) -> Vec<TrackedJob> {
        self.shared.jobs().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.jobs().is_empty()
    }
}

/// Consume one job's stream until it reaches a terminal state.
async fn follow(source: &dyn JobStatusSource, shared: &Shared, job_id: &str) -> Outcome {
    let mut stream = match source.subscribe(job_id).await {
        Ok(stream) => stream,
        Err(e) => return Outcome::Failed(e.to_string()),
    };

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        match event.status {
            JobStatus::Completed => {
                if let Some(percent) = shared.set_percent(job_id, 100) {
                    shared.emit(TrackerEvent::Progress {
                        job_id: job_id.to_string(),
                        percent,
                    });
                }
                return Outcome::Finished;
            }
            JobStatus::Failed => {
                return Outcome::Failed(
                    event.error.unwrap_or_else(|| "job failed".to_string()),
                );
            }
            JobStatus::InProgress => {
                if let Some(percent) = shared.set_percent(job_id, event.percent()) {
                    shared.emit(TrackerEvent::Progress {
                        job_id: job_id.to_string(),
                        percent,
                    });
                }
            }
            JobStatus::Pending => {}
        }
    }

    Outcome::Failed(STREAM_CLOSED_EARLY.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use collection_mover_types::ProgressEvent;
    use futures_util::stream;
    use pretty_assertions::assert_eq;

    /// Replays a fixed script of events for every subscription.
    struct Scripted {
        events: Vec<ProgressEvent>,
        subscriptions: AtomicUsize,
    }

    impl Scripted {
        fn new(events: Vec<ProgressEvent>) -> Arc<Self> {
            Arc::new(Self {
                events,
                subscriptions: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobStatusSource for Scripted {
        async fn subscribe(&self, _job_id: &str) -> Result<EventStream, ClientError> {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(stream::iter(
                self.events.clone().into_iter().map(Ok),
            )))
        }
    }

    struct Refusing;

    #[async_trait]
    impl JobStatusSource for Refusing {
        async fn subscribe(&self, _job_id: &str) -> Result<EventStream, ClientError> {
            Err(ClientError::Status {
                status: 404,
                message: "Job not found: j1".to_string(),
            })
        }
    }

    fn event(status: JobStatus, processed: u64) -> ProgressEvent {
        ProgressEvent {
            job_id: "j1".to_string(),
            status,
            chunks_processed: processed,
            chunks: 3,
            error: None,
        }
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<TrackerEvent>) -> Vec<TrackerEvent> {
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            let removed = matches!(event, TrackerEvent::Removed { .. });
            seen.push(event);
            if removed {
                break;
            }
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_reports_each_percent_once_then_leaves() {
        let source = Scripted::new(vec![
            event(JobStatus::Pending, 0),
            event(JobStatus::InProgress, 1),
            event(JobStatus::InProgress, 1),
            event(JobStatus::InProgress, 2),
            event(JobStatus::InProgress, 3),
            event(JobStatus::Completed, 3),
        ]);
        let (tracker, mut rx) = JobTracker::new(source.clone());
        tracker.set_collection_names([
            CollectionMetadata {
                id: "a".to_string(),
                collection_name: "My List".to_string(),
            },
            CollectionMetadata {
                id: "b".to_string(),
                collection_name: "Liked Companies".to_string(),
            },
        ]);

        let started = tokio::time::Instant::now();
        let handle = tracker.track("j1".to_string(), "a".to_string(), "b".to_string());
        let seen = drain(&mut rx).await;
        handle.unwrap().await.unwrap();

        let j = || "j1".to_string();
        assert_eq!(
            seen,
            vec![
                TrackerEvent::Added {
                    job_id: j(),
                    label: "My List ➡ Liked Companies".to_string(),
                },
                TrackerEvent::Progress { job_id: j(), percent: 33 },
                TrackerEvent::Progress { job_id: j(), percent: 66 },
                TrackerEvent::Progress { job_id: j(), percent: 100 },
                TrackerEvent::Finished { job_id: j() },
                TrackerEvent::Removed { job_id: j() },
            ]
        );
        assert!(started.elapsed() >= DEFAULT_GRACE);
        assert!(tracker.is_empty());
        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_job_stays_visible_during_grace() {
        let source = Scripted::new(vec![event(JobStatus::Completed, 3)]);
        let (tracker, mut rx) = JobTracker::new(source);

        let _handle = tracker.track("j1".to_string(), "a".to_string(), "b".to_string());
        loop {
            if let Some(TrackerEvent::Finished { .. }) = rx.recv().await {
                break;
            }
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot[0].running);
        assert_eq!(snapshot[0].percent, 100);
        assert_eq!(snapshot[0].status, JobStatus::Completed);
        // Unknown collections fall back to their ids.
        assert_eq!(snapshot[0].label, "a ➡ b");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_event_surfaces_error() {
        let mut failed = event(JobStatus::Failed, 1);
        failed.error = Some("Chunk 1 failed: boom".to_string());
        let source = Scripted::new(vec![event(JobStatus::InProgress, 1), failed]);
        let (tracker, mut rx) = JobTracker::new(source);

        let _handle = tracker.track("j1".to_string(), "a".to_string(), "b".to_string());
        let seen = drain(&mut rx).await;

        assert!(seen.contains(&TrackerEvent::Failed {
            job_id: "j1".to_string(),
            error: "Chunk 1 failed: boom".to_string(),
        }));
        assert_eq!(seen.last(), Some(&TrackerEvent::Removed { job_id: "j1".to_string() }));
    }

    #[tokio::test(start_paused = true)]
    async fn early_end_of_stream_fails_without_resubscribing() {
        let source = Scripted::new(vec![event(JobStatus::InProgress, 1)]);
        let (tracker, mut rx) = JobTracker::new(source.clone());

        let _handle = tracker.track("j1".to_string(), "a".to_string(), "b".to_string());
        let seen = drain(&mut rx).await;

        assert!(seen.contains(&TrackerEvent::Failed {
            job_id: "j1".to_string(),
            error: STREAM_CLOSED_EARLY.to_string(),
        }));
        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_subscription_fails_the_entry() {
        let (tracker, mut rx) = JobTracker::new(Arc::new(Refusing));

        let _handle = tracker.track("j1".to_string(), "a".to_string(), "b".to_string());
        let seen = drain(&mut rx).await;

        match &seen[1] {
            TrackerEvent::Failed { error, .. } => assert!(error.contains("404")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_are_tracked_independently() {
        let source = Scripted::new(vec![event(JobStatus::Completed, 3)]);
        let (tracker, mut rx) = JobTracker::with_grace(source, Duration::from_secs(1));

        let first = tracker.track("j1".to_string(), "a".to_string(), "b".to_string());
        let second = tracker.track("j2".to_string(), "b".to_string(), "a".to_string());
        let labels: Vec<String> = tracker.snapshot().into_iter().map(|j| j.label).collect();
        assert_eq!(labels, vec!["a ➡ b", "b ➡ a"]);

        first.unwrap().await.unwrap();
        second.unwrap().await.unwrap();
        assert!(tracker.is_empty());

        let mut removed = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, TrackerEvent::Removed { .. }) {
                removed += 1;
            }
        }
        assert_eq!(removed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_a_job_twice_keeps_the_first_entry() {
        let source = Scripted::new(vec![
            event(JobStatus::InProgress, 1),
            event(JobStatus::Completed, 3),
        ]);
        let (tracker, mut rx) = JobTracker::new(source.clone());

        let first = tracker.track("j1".to_string(), "a".to_string(), "b".to_string());
        let again = tracker.track("j1".to_string(), "c".to_string(), "d".to_string());
        assert!(first.is_some());
        assert!(again.is_none());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].label, "a ➡ b");

        first.unwrap().await.unwrap();
        let mut added = 0;
        let mut removed = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                TrackerEvent::Added { .. } => added += 1,
                TrackerEvent::Removed { .. } => removed += 1,
                _ => {}
            }
        }
        assert_eq!((added, removed), (1, 1));
        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
        assert!(tracker.is_empty());

        // Once removed, the same id can be tracked again.
        assert!(tracker.track("j1".to_string(), "a".to_string(), "b".to_string()).is_some());
    }
}
