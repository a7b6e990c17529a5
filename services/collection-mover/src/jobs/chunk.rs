// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Chunk processor

use std::sync::Arc;

use collection_mover_types::{CollectionId, CompanyId};

use super::MoveError;
use crate::metrics;
use crate::store::{CollectionStore, MoveOutcome};

/// Moves one bounded batch of companies between a fixed pair of collections.
///
/// Each call is atomic (the store applies all of the batch or none of it)
/// and safe to repeat: companies already in the target are skipped.
pub struct ChunkProcessor {
    store: Arc<dyn CollectionStore>,
    source: CollectionId,
    target: CollectionId,
}

impl ChunkProcessor {
    pub fn new(store: Arc<dyn CollectionStore>, source: CollectionId, target: CollectionId) -> Self {
        Self {
            store,
            source,
            target,
        }
    }

    /// Move chunk number `index` (1-based, for reporting).
    pub async fn move_chunk(&self, index: u64, ids: &[CompanyId]) -> Result<MoveOutcome, MoveError> {
        match self
            .store
            .move_companies(ids, &self.source, &self.target)
            .await
        {
            Ok(outcome) => {
                tracing::debug!(
                    chunk = index,
                    moved = outcome.moved,
                    already_in_target = outcome.already_in_target,
                    "Chunk moved"
                );
                metrics::record_chunk_moved();
                Ok(outcome)
            }
            Err(e) if e.is_transient() => Err(MoveError::TransientChunk {
                chunk: index,
                source: e,
            }),
            Err(e) => Err(MoveError::FatalJob(format!("Chunk {} failed: {}", index, e))),
        }
    }
}
