// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared types for the collection mover service and its clients.
//!
//! The collection mover reassigns companies between collections. Small moves
//! can be done synchronously; bulk moves run as background jobs whose
//! progress is streamed to any number of observers. This crate holds the wire
//! types used by the service, the API trait and the client.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

// ============================================================================
// Type Aliases
// ============================================================================

/// Collection identifier (opaque string, a UUID for seeded collections)
pub type CollectionId = String;

/// Company identifier
pub type CompanyId = i64;

/// Move job identifier (UUID string)
pub type JobId = String;

/// Name of the collection whose members are reported as `liked`.
pub const LIKED_COLLECTION_NAME: &str = "Liked Companies";

// ============================================================================
// Collections and Companies
// ============================================================================

/// A collection without its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CollectionMetadata {
    pub id: CollectionId,
    pub collection_name: String,
}

/// A company as shown in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyOutput {
    pub id: CompanyId,
    pub company_name: String,
    /// True when the company is a member of the "Liked Companies" collection
    pub liked: bool,
}

/// One page of all companies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyBatchOutput {
    pub companies: Vec<CompanyOutput>,
    /// Total number of companies, independent of the page
    pub total: u64,
}

/// One page of a collection's members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CollectionOutput {
    pub id: CollectionId,
    pub collection_name: String,
    pub companies: Vec<CompanyOutput>,
    /// Total number of members in the collection
    pub total: u64,
}

// ============================================================================
// Move Requests
// ============================================================================

/// Which companies a bulk move covers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MoveMode {
    /// A caller-supplied set of company ids
    Selected,
    /// Every company in the source collection at dispatch time
    All,
}

/// Body of `POST /companies/move-selected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MoveSelectedPayload {
    pub company_ids: Vec<CompanyId>,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
}

/// Body of `POST /companies/move-all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MoveAllPayload {
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
}

/// Response to a bulk move: the job is accepted, not finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MoveJobResponse {
    pub job_id: JobId,
    pub message: String,
}

/// Body of `POST /companies/move` (single company, synchronous).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MoveCompanyPayload {
    pub company_id: CompanyId,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
}

/// Outcome of a single-company move.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MoveCompanyStatus {
    /// The company changed membership
    Success,
    /// The company was already in the target collection
    Exists,
}

/// Response to `POST /companies/move`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MoveCompanyResponse {
    pub status: MoveCompanyStatus,
    pub message: String,
}

// ============================================================================
// Jobs
// ============================================================================

/// Lifecycle state of a move job.
///
/// `pending -> in_progress -> {completed, failed}`; the last two are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    /// Accepted but not yet started
    #[default]
    Pending,
    /// Chunks are being moved
    InProgress,
    /// Every chunk was moved
    Completed,
    /// A chunk could not be moved; remaining chunks were abandoned
    Failed,
}

impl JobStatus {
    /// True for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::InProgress)
                | (JobStatus::Pending, JobStatus::Completed)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::InProgress, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed)
                | (JobStatus::InProgress, JobStatus::Failed)
        )
    }
}

/// Point-in-time projection of a job, pushed on the status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub chunks_processed: u64,
    pub chunks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completion percentage, rounded down.
    pub fn percent(&self) -> u8 {
        progress_percent(self.chunks_processed, self.chunks)
    }
}

/// `floor(processed / total * 100)`; a job with no chunks counts as done.
pub fn progress_percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = processed.min(total).saturating_mul(100) / total;
    pct as u8
}

/// A job as retained by the service's job registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    pub job_id: JobId,
    pub mode: MoveMode,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
    /// Number of companies the job was dispatched with
    pub companies: u64,
    pub chunks: u64,
    pub chunks_processed: u64,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Project the record onto the event shape sent to subscribers.
    pub fn progress_event(&self) -> ProgressEvent {
        ProgressEvent {
            job_id: self.job_id.clone(),
            status: self.status,
            chunks_processed: self.chunks_processed,
            chunks: self.chunks,
            error: self.error.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
