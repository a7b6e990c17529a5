// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Collection Mover API Client
//!
//! A hand-written async client for the Collection Mover API. Besides the
//! plain request/response endpoints it decodes the job status event stream
//! and provides the pieces an interactive front end needs:
//!
//! - [`MoverClient`] - typed access to every endpoint
//! - [`SseDecoder`] - incremental `text/event-stream` decoding
//! - [`JobTracker`] - follows running jobs and reports their progress
//! - [`CollectionPager`] - debounced page fetches for a collection view

pub mod client;
pub mod pager;
pub mod sse;
pub mod tracker;

pub use client::{ClientError, EventStream, MoverClient};
pub use pager::{CollectionPager, Debouncer, PageRequest, PageSource};
pub use sse::SseDecoder;
pub use tracker::{JobStatusSource, JobTracker, TrackedJob, TrackerEvent};

// Wire types, re-exported so callers need only this crate.
pub use collection_mover_types as types;
