// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Dropshot API trait for the collection mover service.
//!
//! The collection mover reassigns companies between collections. It is
//! responsible for:
//!
//! - Listing collections and paging through their members
//! - Moving a single company synchronously
//! - Accepting bulk moves (a selection, or a whole collection) as
//!   background jobs
//! - Streaming job progress to any number of observers
//!
//! ## Endpoints
//!
//! - `GET /collections` - List collections
//! - `GET /collections/{id}` - Page through a collection
//! - `GET /companies` - Page through all companies
//! - `POST /companies/move` - Move one company
//! - `POST /companies/move-selected` - Start a job moving selected companies
//! - `POST /companies/move-all` - Start a job moving a whole collection
//! - `GET /companies/job-status/{job_id}` - Server-sent progress events
//! - `GET /jobs` - List retained jobs
//! - `GET /jobs/{job_id}` - Get one job
//! - `GET /metrics` - Prometheus metrics

use collection_mover_types::{
    CollectionMetadata, CollectionOutput, CompanyBatchOutput, JobRecord, MoveAllPayload,
    MoveCompanyPayload, MoveCompanyResponse, MoveJobResponse, MoveSelectedPayload,
};
use dropshot::{
    Body, HttpError, HttpResponseAccepted, HttpResponseOk, Path, Query, RequestContext, TypedBody,
};
use http::Response;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default page size for listings.
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

/// Path parameters for collection endpoints.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CollectionPath {
    /// The collection id
    pub id: String,
}

/// Path parameters for job endpoints.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct JobPath {
    /// The job id returned by a bulk move
    pub job_id: String,
}

/// Offset/limit pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PageQuery {
    /// The number of items to skip from the beginning
    #[serde(default)]
    pub offset: u64,
    /// The number of items to fetch
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Collection Mover API
#[dropshot::api_description]
pub trait CollectionMoverApi {
    /// Context type for request handlers
    type Context: Send + Sync + 'static;

    /// List collections
    ///
    /// Returns the id and name of every collection.
    #[endpoint {
        method = GET,
        path = "/collections",
        tags = ["collections"],
    }]
    async fn list_collections(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<CollectionMetadata>>, HttpError>;

    /// Get a page of a collection
    ///
    /// Returns 404 if the collection does not exist.
    #[endpoint {
        method = GET,
        path = "/collections/{id}",
        tags = ["collections"],
    }]
    async fn get_collection(
        rqctx: RequestContext<Self::Context>,
        path: Path<CollectionPath>,
        query: Query<PageQuery>,
    ) -> Result<HttpResponseOk<CollectionOutput>, HttpError>;

    /// Get a page of all companies
    #[endpoint {
        method = GET,
        path = "/companies",
        tags = ["companies"],
    }]
    async fn list_companies(
        rqctx: RequestContext<Self::Context>,
        query: Query<PageQuery>,
    ) -> Result<HttpResponseOk<CompanyBatchOutput>, HttpError>;

    /// Move one company
    ///
    /// Synchronous. Returns status `exists` if the company was already in the
    /// target collection.
    ///
    /// Returns 400 if source and target are the same.
    /// Returns 404 if either collection is unknown or the company is not in
    /// the source collection.
    #[endpoint {
        method = POST,
        path = "/companies/move",
        tags = ["companies"],
    }]
    async fn move_company(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<MoveCompanyPayload>,
    ) -> Result<HttpResponseOk<MoveCompanyResponse>, HttpError>;

    /// Move selected companies
    ///
    /// Starts a background job and returns its id immediately. Follow the
    /// job on `/companies/job-status/{job_id}`.
    ///
    /// Returns 400 if the selection is empty or source equals target.
    /// Returns 404 if either collection is unknown.
    #[endpoint {
        method = POST,
        path = "/companies/move-selected",
        tags = ["companies"],
    }]
    async fn move_selected(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<MoveSelectedPayload>,
    ) -> Result<HttpResponseAccepted<MoveJobResponse>, HttpError>;

    /// Move every company in a collection
    ///
    /// The members of the source collection are snapshotted when the request
    /// is accepted; companies added afterwards are not moved by this job.
    ///
    /// Returns 400 if source equals target.
    /// Returns 404 if either collection is unknown.
    #[endpoint {
        method = POST,
        path = "/companies/move-all",
        tags = ["companies"],
    }]
    async fn move_all(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<MoveAllPayload>,
    ) -> Result<HttpResponseAccepted<MoveJobResponse>, HttpError>;

    /// Stream job progress
    ///
    /// A `text/event-stream` response. Every event is a JSON progress event;
    /// the first one reflects the job's state at subscription time and the
    /// stream ends after the terminal (`completed` or `failed`) event.
    ///
    /// Returns 404 if the job is unknown or has been pruned.
    #[endpoint {
        method = GET,
        path = "/companies/job-status/{job_id}",
        tags = ["jobs"],
    }]
    async fn job_status_stream(
        rqctx: RequestContext<Self::Context>,
        path: Path<JobPath>,
    ) -> Result<Response<Body>, HttpError>;

    /// List jobs
    ///
    /// Returns every job still retained by the service, newest first.
    #[endpoint {
        method = GET,
        path = "/jobs",
        tags = ["jobs"],
    }]
    async fn list_jobs(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<JobRecord>>, HttpError>;

    /// Get a job
    ///
    /// Returns 404 if the job is unknown or has been pruned.
    #[endpoint {
        method = GET,
        path = "/jobs/{job_id}",
        tags = ["jobs"],
    }]
    async fn get_job(
        rqctx: RequestContext<Self::Context>,
        path: Path<JobPath>,
    ) -> Result<HttpResponseOk<JobRecord>, HttpError>;

    /// Prometheus metrics
    #[endpoint {
        method = GET,
        path = "/metrics",
        tags = ["system"],
    }]
    async fn metrics(rqctx: RequestContext<Self::Context>) -> Result<Response<Body>, HttpError>;
}
