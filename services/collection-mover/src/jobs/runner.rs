// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job runner
//!
//! Drives one job from `pending` to a terminal state. Chunks run one at a
//! time and in order: chunk N+1 starts only after chunk N is recorded. A
//! chunk that keeps failing after its retries ends the job as `failed`;
//! chunks already moved stay moved and later chunks are never attempted.

use std::sync::Arc;
use std::time::Duration;

use collection_mover_types::{CollectionId, CompanyId, JobRecord};

use super::MoveError;
use super::chunk::ChunkProcessor;
use super::registry::JobWriter;
use crate::config::MoverConfig;
use crate::metrics;
use crate::store::{CollectionStore, MoveOutcome};

/// Maximum random delay added to each retry.
const RETRY_JITTER_MS: u64 = 50;

/// Runner knobs, captured from the config when the job is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    pub chunk_size: usize,
    pub max_chunk_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&MoverConfig::default())
    }
}

impl From<&MoverConfig> for RunnerSettings {
    fn from(config: &MoverConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            max_chunk_retries: config.max_chunk_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

impl RunnerSettings {
    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

/// Number of chunks needed for `items` companies.
pub fn chunk_count(items: usize, chunk_size: usize) -> u64 {
    items.div_ceil(chunk_size.max(1)) as u64
}

/// What a job moves.
#[derive(Debug, Clone)]
pub struct MovePlan {
    pub company_ids: Vec<CompanyId>,
    pub source: CollectionId,
    pub target: CollectionId,
}

pub struct JobRunner {
    store: Arc<dyn CollectionStore>,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(store: Arc<dyn CollectionStore>, settings: RunnerSettings) -> Self {
        Self { store, settings }
    }

    /// Run the job to a terminal state and return the final record.
    ///
    /// Chunk failures end the job as `failed` and still return `Ok`; an
    /// `Err` means the registry refused an update (for example because the
    /// job was failed at shutdown while it was running).
    pub async fn run(self, mut writer: JobWriter, plan: MovePlan) -> Result<JobRecord, MoveError> {
        let processor = ChunkProcessor::new(Arc::clone(&self.store), plan.source, plan.target);

        writer.start()?;
        let result = self
            .run_chunks(&processor, &plan.company_ids, &mut writer)
            .await;
        settle(writer, result)
    }

    async fn run_chunks(
        &self,
        processor: &ChunkProcessor,
        company_ids: &[CompanyId],
        writer: &mut JobWriter,
    ) -> Result<(), MoveError> {
        for (i, ids) in company_ids.chunks(self.settings.chunk_size).enumerate() {
            self.move_with_retries(processor, i as u64 + 1, ids).await?;
            writer.chunk_done()?;
        }
        Ok(())
    }

    async fn move_with_retries(
        &self,
        processor: &ChunkProcessor,
        index: u64,
        ids: &[CompanyId],
    ) -> Result<MoveOutcome, MoveError> {
        let mut attempt = 0u32;

        loop {
            match processor.move_chunk(index, ids).await {
                Ok(outcome) => return Ok(outcome),
                Err(MoveError::TransientChunk { chunk, source })
                    if attempt < self.settings.max_chunk_retries =>
                {
                    attempt += 1;
                    let jitter = Duration::from_millis(rand::random::<u64>() % RETRY_JITTER_MS);
                    let delay = self.settings.backoff(attempt) + jitter;
                    tracing::warn!(
                        chunk,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "Chunk failed, retrying"
                    );
                    metrics::record_chunk_retry();
                    tokio::time::sleep(delay).await;
                }
                Err(MoveError::TransientChunk { chunk, source }) => {
                    return Err(MoveError::FatalJob(format!(
                        "Chunk {} failed after {} attempt(s): {}",
                        chunk,
                        attempt + 1,
                        source
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Write the terminal state for `result`. Only a terminal state the
/// registry accepted is counted.
fn settle(writer: JobWriter, result: Result<(), MoveError>) -> Result<JobRecord, MoveError> {
    let record = match result {
        Ok(()) => writer.complete()?,
        Err(MoveError::Registry(e)) => {
            tracing::warn!(job_id = %writer.job_id(), error = %e, "Job update rejected, stopping");
            return Err(MoveError::Registry(e));
        }
        Err(e) => writer.fail(e.to_string())?,
    };
    metrics::record_job_finished(record.status);
    Ok(record)
}
