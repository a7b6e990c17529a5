// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Move job engine
//!
//! A bulk move is accepted by the [`dispatcher`], which allocates a record in
//! the [`registry`] and spawns a [`runner`]. The runner hands bounded chunks
//! to the [`chunk`] processor and reports progress through its registry
//! writer. The [`publisher`] turns registry updates into per-subscriber
//! progress streams.

pub mod chunk;
pub mod dispatcher;
pub mod publisher;
pub mod registry;
pub mod runner;

use thiserror::Error;

use crate::store::StoreError;
pub use registry::RegistryError;

/// Move errors
#[derive(Debug, Clone, Error)]
pub enum MoveError {
    /// Bad move parameters (source equals target, empty selection)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown collection, company or job
    #[error("{0}")]
    NotFound(String),

    /// A chunk failed in a way that may succeed on retry
    #[error("Chunk {chunk} failed: {source}")]
    TransientChunk { chunk: u64, source: StoreError },

    /// Retries exhausted or unrecoverable chunk fault; ends the job
    #[error("{0}")]
    FatalJob(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<StoreError> for MoveError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CollectionNotFound(id) => {
                MoveError::NotFound(format!("Collection not found: {}", id))
            }
            StoreError::CompanyNotInSource { .. } => MoveError::NotFound(e.to_string()),
            StoreError::Unavailable(_) => MoveError::Storage(e),
        }
    }
}
