// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Debounced collection paging.
//!
//! Changing the collection, page or page size schedules a fetch after a short
//! delay. A newer change cancels the pending fetch, so a burst of changes
//! costs one request.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use collection_mover_types::{CollectionId, CollectionOutput};

use crate::client::{ClientError, MoverClient};

/// Delay between the last change and the fetch it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Runs the most recently scheduled task after a delay, cancelling any
/// earlier one that has not finished.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        // Held across the spawn so concurrent calls replace in spawn order.
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    /// Drop whatever is scheduled.
    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Which page of which collection to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub collection_id: CollectionId,
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.page_size)
    }
}

/// Anything that can fetch one page of a collection.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    async fn fetch_page(&self, request: &PageRequest) -> Result<CollectionOutput, ClientError>;
}

#[async_trait]
impl PageSource for MoverClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<CollectionOutput, ClientError> {
        self.get_collection(&request.collection_id, request.offset(), request.page_size)
            .await
    }
}

/// Keeps the latest fetched page of a collection view.
pub struct CollectionPager {
    source: Arc<dyn PageSource>,
    request: Mutex<PageRequest>,
    pages: Arc<watch::Sender<Option<CollectionOutput>>>,
    debouncer: Debouncer,
}

impl CollectionPager {
    pub fn new(
        source: Arc<dyn PageSource>,
        initial: PageRequest,
    ) -> (Self, watch::Receiver<Option<CollectionOutput>>) {
        Self::with_delay(source, initial, DEFAULT_DEBOUNCE)
    }

    pub fn with_delay(
        source: Arc<dyn PageSource>,
        initial: PageRequest,
        delay: Duration,
    ) -> (Self, watch::Receiver<Option<CollectionOutput>>) {
        let (tx, rx) = watch::channel(None);
        let pager = Self {
            source,
            request: Mutex::new(initial),
            pages: Arc::new(tx),
            debouncer: Debouncer::new(delay),
        };
        (pager, rx)
    }

    pub fn current(&self) -> PageRequest {
        self.request.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Switch collection, going back to the first page.
    pub fn set_collection(&self, collection_id: CollectionId) {
        self.update(|r| {
            r.collection_id = collection_id;
            r.page = 0;
        });
    }

    pub fn set_page(&self, page: u64) {
        self.update(|r| r.page = page);
    }

    /// Change the page size, going back to the first page.
    pub fn set_page_size(&self, page_size: u64) {
        self.update(|r| {
            r.page_size = page_size.max(1);
            r.page = 0;
        });
    }

    /// Schedule a fetch of the current request without changing it.
    pub fn refresh(&self) {
        self.update(|_| {});
    }

    /// The request lock stays held while scheduling, so the last change
    /// applied is also the last fetch scheduled.
    fn update(&self, change: impl FnOnce(&mut PageRequest)) {
        let mut current = self.request.lock().unwrap_or_else(|e| e.into_inner());
        change(&mut current);
        self.schedule(current.clone());
    }

    fn schedule(&self, request: PageRequest) {
        let source = Arc::clone(&self.source);
        let pages = Arc::clone(&self.pages);
        self.debouncer.schedule(async move {
            match source.fetch_page(&request).await {
                Ok(page) => {
                    pages.send_replace(Some(page));
                }
                Err(e) => {
                    tracing::warn!(
                        collection_id = %request.collection_id,
                        page = request.page,
                        error = %e,
                        "Failed to fetch collection page"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    /// Records every request and answers with an empty page.
    #[derive(Default)]
    struct Recording {
        requests: Mutex<Vec<PageRequest>>,
    }

    #[async_trait]
    impl PageSource for Recording {
        async fn fetch_page(
            &self,
            request: &PageRequest,
        ) -> Result<CollectionOutput, ClientError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(CollectionOutput {
                id: request.collection_id.clone(),
                collection_name: "list".to_string(),
                companies: Vec::new(),
                total: request.offset(),
            })
        }
    }

    fn first_page(collection_id: &str) -> PageRequest {
        PageRequest {
            collection_id: collection_id.to_string(),
            page: 0,
            page_size: 25,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_runs_only_the_last_task() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for i in 1..=3 {
            let runs = Arc::clone(&runs);
            let last = Arc::clone(&last);
            debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(i, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_pending_task() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        debouncer.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_fetches_once() {
        let source = Arc::new(Recording::default());
        let (pager, mut pages) = CollectionPager::new(source.clone(), first_page("a"));

        pager.set_page(1);
        pager.set_page(2);
        pager.set_page_size(50);
        pager.set_page(3);

        pages.changed().await.unwrap();
        let page = pages.borrow().clone().unwrap();
        assert_eq!(page.total, 150);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let requests = source.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![PageRequest {
                collection_id: "a".to_string(),
                page: 3,
                page_size: 50,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn switching_collection_resets_page() {
        let source = Arc::new(Recording::default());
        let (pager, mut pages) = CollectionPager::new(source.clone(), first_page("a"));

        pager.set_page(4);
        pager.set_collection("b".to_string());

        pages.changed().await.unwrap();
        assert_eq!(pager.current(), first_page("b"));
        assert_eq!(pages.borrow().as_ref().unwrap().id, "b");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_changes_fetch_the_final_request() {
        let source = Arc::new(Recording::default());
        let (pager, mut pages) =
            CollectionPager::with_delay(source.clone(), first_page("a"), Duration::from_millis(20));
        let pager = Arc::new(pager);

        let changes: Vec<_> = (1..=32)
            .map(|page| {
                let pager = Arc::clone(&pager);
                tokio::spawn(async move { pager.set_page(page) })
            })
            .collect();
        for change in changes {
            change.await.unwrap();
        }
        pages.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let requests = source.requests.lock().unwrap().clone();
        assert_eq!(requests.last(), Some(&pager.current()));
        assert_eq!(
            pages.borrow().as_ref().unwrap().total,
            pager.current().offset()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_changes_each_fetch() {
        let source = Arc::new(Recording::default());
        let (pager, _pages) = CollectionPager::new(source.clone(), first_page("a"));

        pager.refresh();
        tokio::time::sleep(Duration::from_millis(400)).await;
        pager.set_page(1);
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(source.requests.lock().unwrap().len(), 2);
    }
}
