// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Status stream publisher
//!
//! Each subscription starts from a snapshot of the job record and then
//! follows the job's broadcast channel. A subscriber that falls behind loses
//! the oldest `in_progress` events; the terminal event is always the last
//! one sent, so it is never the one dropped.
//!
//! Subscribers only ever see `in_progress`, `completed` or `failed`. A job
//! that has not started yet is reported as `in_progress` with nothing
//! processed.

use std::sync::Arc;

use futures_util::Stream;
use futures_util::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use collection_mover_types::{JobId, JobStatus, ProgressEvent};

use super::registry::{JobRegistry, RegistryError};

/// Detail of the event sent when a job vanishes under a subscriber.
pub const RECORD_LOST_DETAIL: &str = "job record no longer available";

/// Hands out progress streams for registry jobs.
#[derive(Clone)]
pub struct StatusPublisher {
    registry: Arc<JobRegistry>,
}

impl StatusPublisher {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Subscribe to a job.
    ///
    /// The first event is the job's state right now. If the job is already
    /// terminal that is also the last event.
    pub fn subscribe(&self, job_id: &str) -> Result<ProgressStream, RegistryError> {
        let (snapshot, rx) = self.registry.attach(job_id)?;
        tracing::debug!(job_id = %job_id, status = %snapshot.status, "Status subscriber attached");
        Ok(ProgressStream {
            job_id: job_id.to_string(),
            registry: Arc::clone(&self.registry),
            rx,
            snapshot: Some(pushed(snapshot.progress_event())),
            last: None,
            done: false,
        })
    }
}

fn pushed(mut event: ProgressEvent) -> ProgressEvent {
    if event.status == JobStatus::Pending {
        event.status = JobStatus::InProgress;
    }
    event
}

/// One subscriber's view of a job.
pub struct ProgressStream {
    job_id: JobId,
    registry: Arc<JobRegistry>,
    rx: broadcast::Receiver<ProgressEvent>,
    snapshot: Option<ProgressEvent>,
    last: Option<ProgressEvent>,
    done: bool,
}

impl ProgressStream {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next event, or `None` once the terminal event has been returned.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }
        if let Some(snapshot) = self.snapshot.take() {
            return Some(self.deliver(snapshot));
        }

        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    let event = pushed(event);
                    if self.is_stale(&event) {
                        continue;
                    }
                    return Some(self.deliver(event));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(job_id = %self.job_id, skipped, "Status subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    let event = self.closed_event();
                    return Some(self.deliver(event));
                }
            }
        }
    }

    /// Adapt into a `Stream` that ends after the terminal event.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        stream::unfold(self, |mut progress| async move {
            progress.next_event().await.map(|event| (event, progress))
        })
    }

    fn deliver(&mut self, event: ProgressEvent) -> ProgressEvent {
        if event.is_terminal() {
            self.done = true;
        }
        self.last = Some(event.clone());
        event
    }

    /// An `in_progress` event that does not move past what this subscriber
    /// has already seen.
    fn is_stale(&self, event: &ProgressEvent) -> bool {
        let Some(last) = &self.last else {
            return false;
        };
        event.status == JobStatus::InProgress
            && (event.chunks_processed < last.chunks_processed
                || (last.status == JobStatus::InProgress
                    && event.chunks_processed == last.chunks_processed))
    }

    /// The channel closed without a terminal event reaching us.
    fn closed_event(&self) -> ProgressEvent {
        match self.registry.get(&self.job_id) {
            Ok(record) if record.status.is_terminal() => record.progress_event(),
            _ => {
                tracing::warn!(job_id = %self.job_id, "Job record lost under subscriber");
                let (chunks_processed, chunks) = self
                    .last
                    .as_ref()
                    .map(|e| (e.chunks_processed, e.chunks))
                    .unwrap_or_default();
                ProgressEvent {
                    job_id: self.job_id.clone(),
                    status: JobStatus::Failed,
                    chunks_processed,
                    chunks,
                    error: Some(RECORD_LOST_DETAIL.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::jobs::registry::NewJob;
    use collection_mover_types::MoveMode;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    fn setup(event_buffer: usize) -> (Arc<JobRegistry>, StatusPublisher) {
        let registry = Arc::new(JobRegistry::new(event_buffer));
        let publisher = StatusPublisher::new(Arc::clone(&registry));
        (registry, publisher)
    }

    fn new_job(chunks: u64) -> NewJob {
        NewJob {
            mode: MoveMode::Selected,
            source_collection: "a".to_string(),
            target_collection: "b".to_string(),
            companies: chunks,
            chunks,
        }
    }

    fn summary(events: &[ProgressEvent]) -> Vec<(JobStatus, u64)> {
        events
            .iter()
            .map(|e| (e.status, e.chunks_processed))
            .collect()
    }

    #[tokio::test]
    async fn subscriber_follows_job_to_terminal_event() {
        let (registry, publisher) = setup(16);
        let mut writer = registry.create(new_job(2));
        let stream = publisher.subscribe(writer.job_id()).expect("subscribe");

        writer.start().expect("start");
        writer.chunk_done().expect("chunk");
        writer.chunk_done().expect("chunk");
        writer.complete().expect("complete");

        let events: Vec<ProgressEvent> = stream.into_stream().collect().await;
        assert_eq!(
            summary(&events),
            vec![
                (JobStatus::InProgress, 0),
                (JobStatus::InProgress, 1),
                (JobStatus::InProgress, 2),
                (JobStatus::Completed, 2),
            ]
        );
    }

    #[tokio::test]
    async fn late_subscriber_gets_only_terminal_event() {
        let (registry, publisher) = setup(16);
        let mut writer = registry.create(new_job(1));
        let job_id = writer.job_id().to_string();
        writer.start().expect("start");
        writer.fail("storage gone").expect("fail");

        let events: Vec<ProgressEvent> = publisher
            .subscribe(&job_id)
            .expect("subscribe")
            .into_stream()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, JobStatus::Failed);
        assert_eq!(events[0].error.as_deref(), Some("storage gone"));
    }

    #[tokio::test]
    async fn slow_subscriber_still_sees_terminal_event() {
        let (registry, publisher) = setup(2);
        let mut writer = registry.create(new_job(10));
        let stream = publisher.subscribe(writer.job_id()).expect("subscribe");

        writer.start().expect("start");
        for _ in 0..10 {
            writer.chunk_done().expect("chunk");
        }
        writer.complete().expect("complete");

        let events: Vec<ProgressEvent> = stream.into_stream().collect().await;
        let last = events.last().expect("at least one event");
        assert_eq!(last.status, JobStatus::Completed);
        assert_eq!(last.chunks_processed, 10);
        assert!(events.len() < 13, "intermediate events were coalesced");
        assert!(
            events
                .windows(2)
                .all(|w| w[0].chunks_processed <= w[1].chunks_processed)
        );
    }

    #[tokio::test]
    async fn subscribers_are_independent() {
        let (registry, publisher) = setup(16);
        let mut writer = registry.create(new_job(1));
        let mut early = publisher.subscribe(writer.job_id()).expect("subscribe");
        writer.start().expect("start");
        let late = publisher.subscribe(writer.job_id()).expect("subscribe");

        assert_eq!(
            early.next_event().await.map(|e| (e.status, e.chunks_processed)),
            Some((JobStatus::InProgress, 0))
        );
        drop(early);

        writer.chunk_done().expect("chunk");
        writer.complete().expect("complete");

        let events: Vec<ProgressEvent> = late.into_stream().collect().await;
        assert_eq!(
            summary(&events),
            vec![
                (JobStatus::InProgress, 0),
                (JobStatus::InProgress, 1),
                (JobStatus::Completed, 1),
            ]
        );
    }

    #[tokio::test]
    async fn pending_job_is_never_pushed_as_pending() {
        let (registry, publisher) = setup(16);
        let mut writer = registry.create(new_job(1));
        let mut stream = publisher.subscribe(writer.job_id()).expect("subscribe");

        let first = stream.next_event().await.expect("snapshot");
        assert_eq!(first.status, JobStatus::InProgress);
        assert_eq!(first.chunks_processed, 0);
        assert_eq!(first.percent(), 0);

        writer.start().expect("start");
        writer.chunk_done().expect("chunk");
        writer.complete().expect("complete");

        let rest: Vec<ProgressEvent> = stream.into_stream().collect().await;
        assert!(rest.iter().all(|e| e.status != JobStatus::Pending));
        assert_eq!(
            summary(&rest),
            vec![(JobStatus::InProgress, 1), (JobStatus::Completed, 1)]
        );
    }

    fn stream_over(
        registry: Arc<JobRegistry>,
        job_id: &str,
        rx: broadcast::Receiver<ProgressEvent>,
    ) -> ProgressStream {
        ProgressStream {
            job_id: job_id.to_string(),
            registry,
            rx,
            snapshot: None,
            last: Some(ProgressEvent {
                job_id: job_id.to_string(),
                status: JobStatus::InProgress,
                chunks_processed: 1,
                chunks: 3,
                error: None,
            }),
            done: false,
        }
    }

    #[tokio::test]
    async fn lost_record_ends_stream_with_failed_event() {
        let (registry, _) = setup(4);
        let (tx, rx) = broadcast::channel(4);
        let mut stream = stream_over(registry, "vanished", rx);

        let waiting = tokio::spawn(async move {
            let event = stream.next_event().await;
            (event, stream.next_event().await)
        });
        tokio::task::yield_now().await;
        drop(tx);

        let (event, after) = waiting.await.expect("join");
        let event = event.expect("synthesized event");
        assert_eq!(event.job_id, "vanished");
        assert_eq!(event.status, JobStatus::Failed);
        assert_eq!(event.chunks_processed, 1);
        assert_eq!(event.chunks, 3);
        assert_eq!(event.error.as_deref(), Some(RECORD_LOST_DETAIL));
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn closed_channel_of_finished_job_yields_its_record() {
        let (registry, _) = setup(4);
        let mut writer = registry.create(new_job(3));
        let job_id = writer.job_id().to_string();
        writer.start().expect("start");
        for _ in 0..3 {
            writer.chunk_done().expect("chunk");
        }
        writer.complete().expect("complete");

        let (tx, rx) = broadcast::channel(4);
        let mut stream = stream_over(Arc::clone(&registry), &job_id, rx);
        drop(tx);

        let event = stream.next_event().await.expect("terminal event");
        assert_eq!(event.status, JobStatus::Completed);
        assert_eq!(event.chunks_processed, 3);
        assert_eq!(event.error, None);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (_, publisher) = setup(4);
        assert!(matches!(
            publisher.subscribe("missing"),
            Err(RegistryError::JobNotFound(_))
        ));
    }
}
