// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Collection Mover Library
//!
//! Moves companies between collections. Single moves happen inline; bulk
//! moves run as background jobs processed in chunks, with live progress
//! pushed to any number of subscribers.
//!
//! # Modules
//!
//! - [`config`] - Service configuration (env vars, SIGUSR1 reload)
//! - [`context`] - API context for request handlers
//! - [`jobs`] - Dispatcher, runner, chunk processor, registry and status publisher
//! - [`metrics`] - Prometheus counters
//! - [`sse`] - Server-sent event response bodies
//! - [`store`] - Collection storage trait and in-memory implementation

pub mod config;
pub mod context;
pub mod jobs;
pub mod metrics;
pub mod sse;
pub mod store;

use dropshot::{
    Body, HttpError, HttpResponseAccepted, HttpResponseOk, Path, Query, RequestContext,
    TypedBody,
};
use http::Response;
use http::header::CONTENT_TYPE;

use collection_mover_api::{CollectionMoverApi, CollectionPath, JobPath, PageQuery};
use collection_mover_types::{
    CollectionMetadata, CollectionOutput, CompanyBatchOutput, JobRecord, MoveAllPayload,
    MoveCompanyPayload, MoveCompanyResponse, MoveJobResponse, MoveSelectedPayload,
};

use crate::context::ApiContext;
use crate::jobs::dispatcher::MoveRequest;
use crate::jobs::{MoveError, RegistryError};
use crate::store::StoreError;

/// Collection Mover API implementation
///
/// This enum serves as the implementation type for the `CollectionMoverApi` trait.
/// It contains no data - all state is stored in the `ApiContext`.
pub enum CollectionMoverImpl {}

fn move_error_to_http(e: MoveError) -> HttpError {
    match e {
        MoveError::InvalidRequest(msg) => HttpError::for_bad_request(None, msg),
        MoveError::NotFound(msg) => HttpError::for_not_found(None, msg),
        MoveError::Registry(RegistryError::JobNotFound(id)) => {
            HttpError::for_not_found(None, format!("Job not found: {}", id))
        }
        other => HttpError::for_internal_error(other.to_string()),
    }
}

fn store_error_to_http(e: StoreError) -> HttpError {
    move_error_to_http(e.into())
}

async fn start_job(
    ctx: &ApiContext,
    request: MoveRequest,
) -> Result<HttpResponseAccepted<MoveJobResponse>, HttpError> {
    let mode = request.mode;
    let job = ctx
        .dispatcher
        .dispatch(request)
        .await
        .map_err(move_error_to_http)?;

    Ok(HttpResponseAccepted(MoveJobResponse {
        job_id: job.job_id,
        message: format!("Move {} initiated.", mode),
    }))
}

impl CollectionMoverApi for CollectionMoverImpl {
    type Context = ApiContext;

    async fn list_collections(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<CollectionMetadata>>, HttpError> {
        let ctx = rqctx.context();
        let collections = ctx
            .store
            .list_collections()
            .await
            .map_err(store_error_to_http)?;
        Ok(HttpResponseOk(collections))
    }

    async fn get_collection(
        rqctx: RequestContext<Self::Context>,
        path: Path<CollectionPath>,
        query: Query<PageQuery>,
    ) -> Result<HttpResponseOk<CollectionOutput>, HttpError> {
        let ctx = rqctx.context();
        let id = path.into_inner().id;
        let page = query.into_inner();

        let output = ctx
            .store
            .collection_page(&id, page.offset, page.limit)
            .await
            .map_err(store_error_to_http)?;
        Ok(HttpResponseOk(output))
    }

    async fn list_companies(
        rqctx: RequestContext<Self::Context>,
        query: Query<PageQuery>,
    ) -> Result<HttpResponseOk<CompanyBatchOutput>, HttpError> {
        let ctx = rqctx.context();
        let page = query.into_inner();

        let output = ctx
            .store
            .list_companies(page.offset, page.limit)
            .await
            .map_err(store_error_to_http)?;
        Ok(HttpResponseOk(output))
    }

    async fn move_company(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<MoveCompanyPayload>,
    ) -> Result<HttpResponseOk<MoveCompanyResponse>, HttpError> {
        let ctx = rqctx.context();
        let response = ctx
            .dispatcher
            .move_company(body.into_inner())
            .await
            .map_err(move_error_to_http)?;
        Ok(HttpResponseOk(response))
    }

    async fn move_selected(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<MoveSelectedPayload>,
    ) -> Result<HttpResponseAccepted<MoveJobResponse>, HttpError> {
        let payload = body.into_inner();
        tracing::info!(
            source = %payload.source_collection,
            target = %payload.target_collection,
            count = payload.company_ids.len(),
            "Received move-selected request"
        );
        start_job(rqctx.context(), payload.into()).await
    }

    async fn move_all(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<MoveAllPayload>,
    ) -> Result<HttpResponseAccepted<MoveJobResponse>, HttpError> {
        let payload = body.into_inner();
        tracing::info!(
            source = %payload.source_collection,
            target = %payload.target_collection,
            "Received move-all request"
        );
        start_job(rqctx.context(), payload.into()).await
    }

    async fn job_status_stream(
        rqctx: RequestContext<Self::Context>,
        path: Path<JobPath>,
    ) -> Result<Response<Body>, HttpError> {
        let ctx = rqctx.context();
        let job_id = path.into_inner().job_id;

        let progress = ctx
            .publisher
            .subscribe(&job_id)
            .map_err(|e| move_error_to_http(e.into()))?;
        sse::event_stream_response(progress)
    }

    async fn list_jobs(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<JobRecord>>, HttpError> {
        Ok(HttpResponseOk(rqctx.context().registry.list()))
    }

    async fn get_job(
        rqctx: RequestContext<Self::Context>,
        path: Path<JobPath>,
    ) -> Result<HttpResponseOk<JobRecord>, HttpError> {
        let ctx = rqctx.context();
        let job_id = path.into_inner().job_id;

        let record = ctx
            .registry
            .get(&job_id)
            .map_err(|e| move_error_to_http(e.into()))?;
        Ok(HttpResponseOk(record))
    }

    async fn metrics(_rqctx: RequestContext<Self::Context>) -> Result<Response<Body>, HttpError> {
        Response::builder()
            .status(200)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(metrics::gather_metrics().into())
            .map_err(|e| HttpError::for_internal_error(format!("Failed to build response: {}", e)))
    }
}
