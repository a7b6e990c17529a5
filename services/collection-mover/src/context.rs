// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! API context for the collection mover

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::MoverConfig;
use crate::jobs::dispatcher::MoveDispatcher;
use crate::jobs::publisher::StatusPublisher;
use crate::jobs::registry::JobRegistry;
use crate::store::CollectionStore;

/// API context shared across all request handlers
pub struct ApiContext {
    pub store: Arc<dyn CollectionStore>,
    pub registry: Arc<JobRegistry>,
    pub dispatcher: MoveDispatcher,
    pub publisher: StatusPublisher,
}

impl ApiContext {
    /// Wire the job engine around `store`.
    ///
    /// The registry's event buffer is fixed here; other settings are read
    /// from `config` whenever a job is dispatched.
    pub fn new(store: Arc<dyn CollectionStore>, config: watch::Receiver<MoverConfig>) -> Self {
        let registry = Arc::new(JobRegistry::new(config.borrow().event_buffer));
        let dispatcher =
            MoveDispatcher::new(Arc::clone(&store), Arc::clone(&registry), config);
        let publisher = StatusPublisher::new(Arc::clone(&registry));

        Self {
            store,
            registry,
            dispatcher,
            publisher,
        }
    }
}
