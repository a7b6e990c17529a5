// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Server-sent event responses
//!
//! A progress stream is forwarded by a spawned task into a small channel
//! that backs the response body. When the client goes away the body is
//! dropped, the forwarder's next send fails and the task exits; the job
//! itself is unaffected.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use dropshot::{Body, HttpError};
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body::Frame;
use tokio::sync::mpsc;

use collection_mover_types::ProgressEvent;

use crate::jobs::publisher::ProgressStream;

/// Frames buffered between the forwarder and the connection.
const FRAME_BUFFER: usize = 4;

/// Response body fed from a channel of pre-encoded frames.
pub struct EventStreamBody {
    rx: mpsc::Receiver<Bytes>,
}

impl http_body::Body for EventStreamBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.get_mut()
            .rx
            .poll_recv(cx)
            .map(|frame| frame.map(|data| Ok(Frame::data(data))))
    }
}

/// Encode one event as a `data:` frame.
pub fn encode_event(event: &ProgressEvent) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

/// Build a `text/event-stream` response that follows `progress` until its
/// terminal event.
pub fn event_stream_response(progress: ProgressStream) -> Result<Response<Body>, HttpError> {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(forward_events(progress, tx));

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .body(Body::wrap(EventStreamBody { rx }))
        .map_err(|e| HttpError::for_internal_error(format!("Failed to build response: {}", e)))
}

async fn forward_events(mut progress: ProgressStream, tx: mpsc::Sender<Bytes>) {
    while let Some(event) = progress.next_event().await {
        let frame = match encode_event(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(job_id = %progress.job_id(), error = %e, "Failed to encode event");
                return;
            }
        };
        if tx.send(frame).await.is_err() {
            tracing::debug!(job_id = %progress.job_id(), "Status subscriber disconnected");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use collection_mover_types::JobStatus;

    #[test]
    fn frame_is_data_line_with_blank_terminator() {
        let event = ProgressEvent {
            job_id: "j".to_string(),
            status: JobStatus::Completed,
            chunks_processed: 3,
            chunks: 3,
            error: None,
        };

        let frame = encode_event(&event).expect("encode");

        assert_eq!(
            &frame[..],
            br#"data: {"job_id":"j","status":"completed","chunks_processed":3,"chunks":3}

"#
        );
    }
}
