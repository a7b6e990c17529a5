// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Move dispatcher
//!
//! Validates move requests, allocates the job record and starts the runner
//! in the background. Validation failures are returned to the caller and
//! allocate nothing; everything that goes wrong after the job id has been
//! handed out is reported on the job's status stream only.

use std::sync::Arc;

use indexmap::IndexSet;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use collection_mover_types::{
    CollectionId, CompanyId, JobId, JobRecord, MoveAllPayload, MoveCompanyPayload,
    MoveCompanyResponse, MoveCompanyStatus, MoveMode, MoveSelectedPayload,
};

use super::MoveError;
use super::registry::{JobRegistry, NewJob};
use super::runner::{JobRunner, MovePlan, RunnerSettings, chunk_count};
use crate::config::MoverConfig;
use crate::metrics;
use crate::store::CollectionStore;

/// A bulk move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub mode: MoveMode,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
    /// Ignored for [`MoveMode::All`]
    pub company_ids: Vec<CompanyId>,
}

impl From<MoveSelectedPayload> for MoveRequest {
    fn from(payload: MoveSelectedPayload) -> Self {
        Self {
            mode: MoveMode::Selected,
            source_collection: payload.source_collection,
            target_collection: payload.target_collection,
            company_ids: payload.company_ids,
        }
    }
}

impl From<MoveAllPayload> for MoveRequest {
    fn from(payload: MoveAllPayload) -> Self {
        Self {
            mode: MoveMode::All,
            source_collection: payload.source_collection,
            target_collection: payload.target_collection,
            company_ids: Vec::new(),
        }
    }
}

/// A job that has been accepted and is running in the background.
pub struct DispatchedJob {
    pub job_id: JobId,
    task: JoinHandle<Result<JobRecord, MoveError>>,
}

impl DispatchedJob {
    /// Wait for the runner to finish. Dropping the handle instead leaves the
    /// job running.
    pub async fn wait(self) -> Result<JobRecord, MoveError> {
        self.task
            .await
            .map_err(|e| MoveError::FatalJob(format!("Job runner panicked: {}", e)))?
    }
}

#[derive(Clone)]
pub struct MoveDispatcher {
    store: Arc<dyn CollectionStore>,
    registry: Arc<JobRegistry>,
    config: watch::Receiver<MoverConfig>,
}

impl MoveDispatcher {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        registry: Arc<JobRegistry>,
        config: watch::Receiver<MoverConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Accept a bulk move and start it. Returns as soon as the job exists.
    pub async fn dispatch(&self, request: MoveRequest) -> Result<DispatchedJob, MoveError> {
        if request.source_collection == request.target_collection {
            return Err(MoveError::InvalidRequest(
                "Source and target collections must differ".to_string(),
            ));
        }
        if request.mode == MoveMode::Selected && request.company_ids.is_empty() {
            return Err(MoveError::InvalidRequest(
                "No companies selected".to_string(),
            ));
        }

        self.store.collection_name(&request.source_collection).await?;
        self.store.collection_name(&request.target_collection).await?;

        let company_ids = match request.mode {
            MoveMode::Selected => request
                .company_ids
                .into_iter()
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect::<Vec<_>>(),
            // Snapshot now; later additions to the source are not part of
            // this job.
            MoveMode::All => {
                self.store
                    .collection_company_ids(&request.source_collection)
                    .await?
            }
        };

        let settings = RunnerSettings::from(&*self.config.borrow());
        let chunks = chunk_count(company_ids.len(), settings.chunk_size);

        let writer = self.registry.create(NewJob {
            mode: request.mode,
            source_collection: request.source_collection.clone(),
            target_collection: request.target_collection.clone(),
            companies: company_ids.len() as u64,
            chunks,
        });
        let job_id = writer.job_id().to_string();
        metrics::record_job_dispatched();

        tracing::info!(
            job_id = %job_id,
            mode = %request.mode,
            source = %request.source_collection,
            target = %request.target_collection,
            companies = company_ids.len(),
            chunks,
            "Move job dispatched"
        );

        let runner = JobRunner::new(Arc::clone(&self.store), settings);
        let plan = MovePlan {
            company_ids,
            source: request.source_collection,
            target: request.target_collection,
        };
        let task = tokio::spawn(runner.run(writer, plan));

        Ok(DispatchedJob { job_id, task })
    }

    /// Move one company synchronously.
    pub async fn move_company(
        &self,
        payload: MoveCompanyPayload,
    ) -> Result<MoveCompanyResponse, MoveError> {
        if payload.source_collection == payload.target_collection {
            return Err(MoveError::InvalidRequest(
                "Source and target collections must differ".to_string(),
            ));
        }

        let outcome = self
            .store
            .move_companies(
                &[payload.company_id],
                &payload.source_collection,
                &payload.target_collection,
            )
            .await?;

        let response = if outcome.moved == 0 {
            MoveCompanyResponse {
                status: MoveCompanyStatus::Exists,
                message: format!(
                    "Company already exists in {}",
                    payload.target_collection
                ),
            }
        } else {
            MoveCompanyResponse {
                status: MoveCompanyStatus::Success,
                message: format!(
                    "Company moved from {} to {}",
                    payload.source_collection, payload.target_collection
                ),
            }
        };

        tracing::info!(
            company_id = payload.company_id,
            source = %payload.source_collection,
            target = %payload.target_collection,
            status = %response.status,
            "Single company move"
        );
        Ok(response)
    }
}
