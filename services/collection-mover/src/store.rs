// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Collection storage
//!
//! The job engine only talks to storage through [`CollectionStore`]. The
//! in-memory [`MemoryStore`] backs the service binary and the tests.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tokio::sync::RwLock;

use collection_mover_types::{
    CollectionId, CollectionMetadata, CollectionOutput, CompanyBatchOutput, CompanyId,
    CompanyOutput, LIKED_COLLECTION_NAME,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(CollectionId),
    #[error("Company {company_id} is not in collection {collection_id}")]
    CompanyNotInSource {
        company_id: CompanyId,
        collection_id: CollectionId,
    },
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, StoreError::CollectionNotFound(_))
    }
}

/// Result of a membership move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Companies that changed membership
    pub moved: usize,
    /// Companies that were already in the target (no-ops)
    pub already_in_target: usize,
}

/// Storage operations the service needs.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<CollectionMetadata>, StoreError>;

    async fn collection_name(&self, id: &str) -> Result<String, StoreError>;

    async fn collection_page(
        &self,
        id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<CollectionOutput, StoreError>;

    async fn collection_size(&self, id: &str) -> Result<u64, StoreError>;

    /// Membership of a collection, in order, at the time of the call.
    async fn collection_company_ids(&self, id: &str) -> Result<Vec<CompanyId>, StoreError>;

    async fn list_companies(&self, offset: u64, limit: u64)
    -> Result<CompanyBatchOutput, StoreError>;

    /// Move companies from `source` to `target`.
    ///
    /// All or nothing: every id is validated before anything changes. A
    /// company already in `target` is a no-op, so repeating a successful
    /// call changes nothing.
    async fn move_companies(
        &self,
        ids: &[CompanyId],
        source: &str,
        target: &str,
    ) -> Result<MoveOutcome, StoreError>;
}

struct Collection {
    name: String,
    members: IndexSet<CompanyId>,
}

#[derive(Default)]
struct StoreState {
    collections: IndexMap<CollectionId, Collection>,
    companies: BTreeMap<CompanyId, String>,
}

impl StoreState {
    fn collection(&self, id: &str) -> Result<&Collection, StoreError> {
        self.collections
            .get(id)
            .ok_or_else(|| StoreError::CollectionNotFound(id.to_string()))
    }

    fn liked_members(&self) -> Option<&IndexSet<CompanyId>> {
        self.collections
            .values()
            .find(|c| c.name == LIKED_COLLECTION_NAME)
            .map(|c| &c.members)
    }

    fn company_output(&self, id: CompanyId, liked: Option<&IndexSet<CompanyId>>) -> CompanyOutput {
        CompanyOutput {
            id,
            company_name: self
                .companies
                .get(&id)
                .cloned()
                .unwrap_or_else(|| default_company_name(id)),
            liked: liked.is_some_and(|set| set.contains(&id)),
        }
    }
}

fn default_company_name(id: CompanyId) -> String {
    format!("Company {}", id)
}

fn page_bounds(offset: u64, limit: u64) -> (usize, usize) {
    (
        usize::try_from(offset).unwrap_or(usize::MAX),
        usize::try_from(limit).unwrap_or(usize::MAX),
    )
}

/// In-memory collection store
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the demo data set: `My List` holds every company, `Liked
    /// Companies` the first 10 and `Companies to Ignore List` the first 50.
    pub async fn seeded(company_count: u64) -> Self {
        let store = Self::new();
        let count = CompanyId::try_from(company_count).unwrap_or(CompanyId::MAX);
        let ids: Vec<CompanyId> = (1..=count).collect();

        store.create_collection("My List", ids.iter().copied()).await;
        store
            .create_collection(LIKED_COLLECTION_NAME, ids.iter().copied().take(10))
            .await;
        store
            .create_collection("Companies to Ignore List", ids.iter().copied().take(50))
            .await;

        tracing::info!(companies = count, "Seeded collection store");
        store
    }

    /// Register a company name.
    pub async fn add_company(&self, id: CompanyId, name: &str) {
        self.state
            .write()
            .await
            .companies
            .insert(id, name.to_string());
    }

    /// Create a collection with the given members and return its id.
    ///
    /// Companies that were never registered get a generated name.
    pub async fn create_collection(
        &self,
        name: &str,
        members: impl IntoIterator<Item = CompanyId>,
    ) -> CollectionId {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.write().await;

        let members: IndexSet<CompanyId> = members.into_iter().collect();
        for company in &members {
            state
                .companies
                .entry(*company)
                .or_insert_with(|| default_company_name(*company));
        }

        state.collections.insert(
            id.clone(),
            Collection {
                name: name.to_string(),
                members,
            },
        );
        id
    }

    /// Append a company to a collection.
    pub async fn add_to_collection(
        &self,
        collection: &str,
        company: CompanyId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .companies
            .entry(company)
            .or_insert_with(|| default_company_name(company));
        state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?
            .members
            .insert(company);
        Ok(())
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<CollectionMetadata>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .iter()
            .map(|(id, c)| CollectionMetadata {
                id: id.clone(),
                collection_name: c.name.clone(),
            })
            .collect())
    }

    async fn collection_name(&self, id: &str) -> Result<String, StoreError> {
        let state = self.state.read().await;
        Ok(state.collection(id)?.name.clone())
    }

    async fn collection_page(
        &self,
        id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<CollectionOutput, StoreError> {
        let state = self.state.read().await;
        let collection = state.collection(id)?;
        let liked = state.liked_members();
        let (skip, take) = page_bounds(offset, limit);

        let companies = collection
            .members
            .iter()
            .skip(skip)
            .take(take)
            .map(|company| state.company_output(*company, liked))
            .collect();

        Ok(CollectionOutput {
            id: id.to_string(),
            collection_name: collection.name.clone(),
            companies,
            total: collection.members.len() as u64,
        })
    }

    async fn collection_size(&self, id: &str) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.collection(id)?.members.len() as u64)
    }

    async fn collection_company_ids(&self, id: &str) -> Result<Vec<CompanyId>, StoreError> {
        let state = self.state.read().await;
        Ok(state.collection(id)?.members.iter().copied().collect())
    }

    async fn list_companies(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<CompanyBatchOutput, StoreError> {
        let state = self.state.read().await;
        let liked = state.liked_members();
        let (skip, take) = page_bounds(offset, limit);

        let companies = state
            .companies
            .keys()
            .skip(skip)
            .take(take)
            .map(|company| state.company_output(*company, liked))
            .collect();

        Ok(CompanyBatchOutput {
            companies,
            total: state.companies.len() as u64,
        })
    }

    async fn move_companies(
        &self,
        ids: &[CompanyId],
        source: &str,
        target: &str,
    ) -> Result<MoveOutcome, StoreError> {
        let mut state = self.state.write().await;
        let source_members = &state.collection(source)?.members;
        let target_members = &state.collection(target)?.members;

        if source == target {
            return Ok(MoveOutcome {
                moved: 0,
                already_in_target: ids.len(),
            });
        }

        // Validate the whole batch before touching anything.
        let mut outcome = MoveOutcome::default();
        let mut to_add = Vec::with_capacity(ids.len());
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if target_members.contains(id) {
                outcome.already_in_target += 1;
            } else if source_members.contains(id) {
                outcome.moved += 1;
                to_add.push(*id);
            } else {
                return Err(StoreError::CompanyNotInSource {
                    company_id: *id,
                    collection_id: source.to_string(),
                });
            }
        }

        if let Some(collection) = state.collections.get_mut(source) {
            collection.members.retain(|id| !seen.contains(id));
        }
        if let Some(collection) = state.collections.get_mut(target) {
            collection.members.extend(to_add);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    async fn two_collections() -> (MemoryStore, CollectionId, CollectionId) {
        let store = MemoryStore::new();
        let source = store.create_collection("source", 1..=5).await;
        let target = store.create_collection("target", [4]).await;
        (store, source, target)
    }

    #[tokio::test]
    async fn move_changes_membership() {
        let (store, source, target) = two_collections().await;

        let outcome = store
            .move_companies(&[1, 2], &source, &target)
            .await
            .expect("move");

        assert_eq!(outcome.moved, 2);
        assert_eq!(outcome.already_in_target, 0);
        assert_eq!(
            store.collection_company_ids(&source).await.expect("source"),
            vec![3, 4, 5]
        );
        assert_eq!(
            store.collection_company_ids(&target).await.expect("target"),
            vec![4, 1, 2]
        );
    }

    #[tokio::test]
    async fn moving_target_resident_company_is_noop() {
        let (store, source, target) = two_collections().await;

        store
            .move_companies(&[1], &source, &target)
            .await
            .expect("first move");
        let again = store
            .move_companies(&[1], &source, &target)
            .await
            .expect("repeat move");

        assert_eq!(again.moved, 0);
        assert_eq!(again.already_in_target, 1);
        assert_eq!(store.collection_size(&target).await.expect("size"), 2);
    }

    #[tokio::test]
    async fn move_is_all_or_nothing() {
        let (store, source, target) = two_collections().await;

        let err = store
            .move_companies(&[1, 99, 2], &source, &target)
            .await
            .expect_err("99 is not in source");

        assert!(matches!(
            err,
            StoreError::CompanyNotInSource { company_id: 99, .. }
        ));
        assert_eq!(store.collection_size(&source).await.expect("size"), 5);
        assert_eq!(store.collection_size(&target).await.expect("size"), 1);
    }

    #[tokio::test]
    async fn unknown_collection_is_not_found() {
        let (store, source, _) = two_collections().await;

        let err = store
            .move_companies(&[1], &source, "nope")
            .await
            .expect_err("unknown target");

        assert_eq!(err, StoreError::CollectionNotFound("nope".to_string()));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn page_reports_total_and_liked() {
        let store = MemoryStore::seeded(25).await;
        let collections = store.list_collections().await.expect("list");
        assert_eq!(collections.len(), 3);
        let my_list = &collections[0];

        let page = store
            .collection_page(&my_list.id, 8, 4)
            .await
            .expect("page");

        assert_eq!(page.total, 25);
        let ids: Vec<CompanyId> = page.companies.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![9, 10, 11, 12]);
        let liked: Vec<bool> = page.companies.iter().map(|c| c.liked).collect();
        assert_eq!(liked, vec![true, true, false, false]);
        assert_eq!(page.companies[0].company_name, "Company 9");
    }

    #[tokio::test]
    async fn company_listing_pages() {
        let store = MemoryStore::seeded(12).await;

        let page = store.list_companies(10, 10).await.expect("page");

        assert_eq!(page.total, 12);
        assert_eq!(page.companies.len(), 2);
    }
}
