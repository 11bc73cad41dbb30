// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A writable stream that uploads its data in fixed-size chunks.

use crate::Result;
use crate::buffer::ChunkBuffer;
use crate::error::{TransportError, UploadError};
use crate::model::{UploadTarget, UploadedObject};
use crate::options::UploadOptions;
use crate::transport::{Chunk, ResumableTransport, TransmitStatus, UploadHandle};
use bytes::Bytes;
use gax::retry_result::RetryResult;
use gax::retry_state::RetryState;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// The lifecycle of an [UploadSession].
///
/// ```text
/// Uninitiated -> Active -> Finalizing -> Complete
///      |           |           |
///      +-----------+-----------+-> Failed -> Aborted
///                  |
///                  +-> Aborted
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, the service has not been contacted.
    Uninitiated,
    /// The service created the session and accepts chunks.
    Active,
    /// The final chunk is in flight.
    Finalizing,
    /// The object is finalized.
    Complete,
    /// A fatal error stopped the upload.
    Failed,
    /// The session was cancelled in the service.
    Aborted,
}

/// Uploads a stream of bytes to a single object.
///
/// Applications write bytes in pieces of any size. The session buffers them
/// and, whenever the buffer holds at least `chunk_size` bytes, sends exactly
/// `chunk_size` bytes to the service. `close()` sends any remaining bytes as
/// the final chunk and returns the new object.
///
/// Failed chunks are retried as configured by the
/// [UploadOptions][crate::options::UploadOptions]. Before each retry the
/// session asks the service how many bytes it persisted, and only sends the
/// rest of the chunk.
///
/// # Example
/// ```no_run
/// # use pipeline_upload::{gcs::GcsTransport, model::UploadTarget, options::UploadOptions};
/// # use pipeline_upload::session::UploadSession;
/// # async fn sample() -> anyhow::Result<()> {
/// let transport = GcsTransport::builder().build().await?;
/// let mut session = UploadSession::open(
///     std::sync::Arc::new(transport),
///     UploadTarget::new("my-bucket", "my-object.csv"),
///     UploadOptions::new().with_content_type("text/csv"),
/// )
/// .await?;
/// session.write("a,b,c\n").await?;
/// session.write("1,2,3\n").await?;
/// let object = session.close().await?;
/// println!("uploaded {object:?}");
/// # Ok(()) }
/// ```
pub struct UploadSession {
    transport: Arc<dyn ResumableTransport>,
    target: UploadTarget,
    options: UploadOptions,
    buffer: ChunkBuffer,
    handle: Option<UploadHandle>,
    state: SessionState,
    persisted: u64,
}

enum Interrupted {
    Cancelled,
    Failed(TransportError),
}

enum Progress {
    Done(Option<Box<UploadedObject>>),
    Pending(Chunk),
}

impl UploadSession {
    /// Validates the configuration, without contacting the service.
    pub fn new(
        transport: Arc<dyn ResumableTransport>,
        target: UploadTarget,
        options: UploadOptions,
    ) -> Result<Self> {
        target.validate()?;
        let alignment = transport.alignment();
        let chunk_size = options.chunk_size;
        if chunk_size == 0 || alignment == 0 || chunk_size % alignment != 0 {
            return Err(UploadError::InvalidChunkSize {
                chunk_size,
                alignment,
            });
        }
        Ok(Self {
            transport,
            target,
            options,
            buffer: ChunkBuffer::new(),
            handle: None,
            state: SessionState::Uninitiated,
            persisted: 0,
        })
    }

    /// Creates the session and starts the upload in the service.
    pub async fn open(
        transport: Arc<dyn ResumableTransport>,
        target: UploadTarget,
        options: UploadOptions,
    ) -> Result<Self> {
        let mut session = Self::new(transport, target, options)?;
        session.start().await?;
        Ok(session)
    }

    /// Creates the upload session in the service.
    pub async fn start(&mut self) -> Result<()> {
        self.expect_state("start", SessionState::Uninitiated)?;
        let call = self
            .transport
            .initiate(&self.target, &self.options.metadata);
        match self.attempt(call).await {
            Ok(handle) => {
                tracing::info!(upload = %self.target, "started resumable upload session");
                self.handle = Some(handle);
                self.state = SessionState::Active;
                Ok(())
            }
            Err(Interrupted::Cancelled) => Err(self.fail(UploadError::Cancelled)),
            Err(Interrupted::Failed(e)) => Err(self.fail(UploadError::SessionInitiation(e))),
        }
    }

    /// Appends `data` to the upload.
    ///
    /// Sends as many full chunks as the buffer holds before returning. On
    /// success, returns the number of bytes accepted, that is, `data.len()`.
    pub async fn write<B: Into<Bytes>>(&mut self, data: B) -> Result<usize> {
        self.expect_state("write", SessionState::Active)?;
        let data = data.into();
        let len = data.len();
        self.buffer.push(data);
        while self.buffer.len() >= self.options.chunk_size {
            let offset = self.buffer.consumed();
            let chunk = Chunk::new(offset, self.buffer.read(self.options.chunk_size), false);
            if let Err(e) = self.send(chunk).await {
                return Err(self.fail(e));
            }
        }
        Ok(len)
    }

    /// Sends any buffered bytes and finalizes the object.
    ///
    /// Returns `Ok(None)`, without contacting the service, if the session has
    /// already failed.
    pub async fn close(&mut self) -> Result<Option<UploadedObject>> {
        match self.state {
            SessionState::Active => {}
            SessionState::Failed => {
                tracing::debug!(upload = %self.target, "ignoring close() on a failed upload session");
                return Ok(None);
            }
            state => {
                return Err(UploadError::InvalidState {
                    operation: "close",
                    state,
                });
            }
        }
        self.state = SessionState::Finalizing;
        let offset = self.buffer.consumed();
        let remaining = self.buffer.len();
        let chunk = Chunk::new(offset, self.buffer.read(remaining), true);
        match self.send(chunk).await {
            Ok(Some(object)) => {
                self.state = SessionState::Complete;
                tracing::info!(upload = %self.target, size = object.size, "upload finalized");
                Ok(Some(*object))
            }
            Ok(None) => Err(self.fail(UploadError::Finalization(TransportError::deser(
                "the service did not return the finalized object",
            )))),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Cancels the upload in the service, discarding any persisted bytes.
    ///
    /// Valid before the upload is finalized, including after a failure. The
    /// cancellation token is ignored, the request is only bounded by the
    /// attempt timeout.
    pub async fn abort(&mut self) -> Result<()> {
        match self.state {
            SessionState::Uninitiated | SessionState::Active | SessionState::Failed => {}
            state => {
                return Err(UploadError::InvalidState {
                    operation: "abort",
                    state,
                });
            }
        }
        let Some(handle) = self.handle.clone() else {
            self.state = SessionState::Aborted;
            return Ok(());
        };
        let call = self.transport.abort(&handle);
        let result = match self.options.attempt_timeout {
            None => call.await,
            Some(t) => tokio::time::timeout(t, call)
                .await
                .unwrap_or_else(|_| Err(TransportError::Timeout(t))),
        };
        result.map_err(UploadError::Abort)?;
        tracing::info!(upload = %self.target, "upload session aborted");
        self.state = SessionState::Aborted;
        Ok(())
    }

    /// The number of bytes removed from the buffer and handed to the
    /// transport.
    ///
    /// This counts bytes in chunks that are still in flight, it is not the
    /// number of bytes persisted by the service.
    pub fn tell(&self) -> u64 {
        self.buffer.consumed()
    }

    /// The number of bytes written but not yet sent.
    pub fn bytes_buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The number of bytes the service has confirmed as persisted.
    pub fn persisted_size(&self) -> u64 {
        self.persisted
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The bucket and object receiving the data.
    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// The number of bytes sent in each non-final request.
    pub fn chunk_size(&self) -> usize {
        self.options.chunk_size
    }

    /// The session handle, once the service has created the session.
    pub fn upload_handle(&self) -> Option<&UploadHandle> {
        self.handle.as_ref()
    }

    /// Returns a token that cancels any pending request from this session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.options.cancellation.clone()
    }

    fn expect_state(&self, operation: &'static str, want: SessionState) -> Result<()> {
        if self.state == want {
            return Ok(());
        }
        Err(UploadError::InvalidState {
            operation,
            state: self.state,
        })
    }

    fn fail(&mut self, error: UploadError) -> UploadError {
        tracing::warn!(upload = %self.target, "upload session failed: {error}");
        self.state = SessionState::Failed;
        error
    }

    /// Sends `chunk`, retrying and resuming until the service persists all of
    /// it.
    async fn send(&mut self, chunk: Chunk) -> Result<Option<Box<UploadedObject>>> {
        let Some(handle) = self.handle.clone() else {
            return Err(UploadError::InvalidState {
                operation: "transmit",
                state: self.state,
            });
        };
        let start = Instant::now();
        let mut attempts = 0_u32;
        let mut pending = chunk;
        loop {
            attempts += 1;
            tracing::debug!(
                upload = %self.target,
                offset = pending.offset(),
                len = pending.len(),
                last = pending.is_final(),
                attempts,
                "sending chunk"
            );
            let (status, recovered) =
                match self.attempt(self.transport.transmit(&handle, &pending)).await {
                    Ok(status) => (status, false),
                    Err(Interrupted::Cancelled) => return Err(UploadError::Cancelled),
                    Err(Interrupted::Failed(e)) => {
                        self.backoff(&pending, start, attempts, e).await?;
                        let status = self
                            .query_progress(&handle, &pending, start, &mut attempts)
                            .await?;
                        (status, true)
                    }
                };
            let offset = pending.offset();
            match self.advance(pending, status)? {
                Progress::Done(object) => return Ok(object),
                // A successful request that persists nothing counts as a
                // failed attempt.
                Progress::Pending(rest) if !recovered && rest.offset() == offset => {
                    let error = TransportError::NoProgress { offset };
                    self.backoff(&rest, start, attempts, error).await?;
                    pending = rest;
                }
                Progress::Pending(rest) => pending = rest,
            }
        }
    }

    async fn query_progress(
        &self,
        handle: &UploadHandle,
        chunk: &Chunk,
        start: Instant,
        attempts: &mut u32,
    ) -> Result<TransmitStatus> {
        loop {
            match self.attempt(self.transport.recover(handle)).await {
                Ok(status) => return Ok(status),
                Err(Interrupted::Cancelled) => return Err(UploadError::Cancelled),
                Err(Interrupted::Failed(e)) => {
                    *attempts += 1;
                    self.backoff(chunk, start, *attempts, e).await?;
                }
            }
        }
    }

    /// Consults the retry policy and, if the error is retryable, waits.
    async fn backoff(
        &self,
        chunk: &Chunk,
        start: Instant,
        attempts: u32,
        error: TransportError,
    ) -> Result<()> {
        // Chunk requests carry their offset, repeating them is safe.
        let state = RetryState::new(true)
            .set_start(start)
            .set_attempt_count(attempts);
        let flow = self
            .options
            .retry_policy
            .on_error(&state, gax::error::Error::from(&error));
        match flow {
            RetryResult::Continue(_) => {}
            RetryResult::Permanent(_) if chunk.is_final() => {
                return Err(UploadError::Finalization(error));
            }
            RetryResult::Permanent(_) => {
                return Err(UploadError::Transmission {
                    offset: chunk.offset(),
                    source: error,
                });
            }
            RetryResult::Exhausted(_) => {
                return Err(UploadError::RetryExhausted {
                    offset: chunk.offset(),
                    attempts,
                    source: error,
                });
            }
        }
        let delay = self.options.backoff_policy.on_failure(&state);
        tracing::warn!(
            upload = %self.target,
            offset = chunk.offset(),
            attempts,
            ?delay,
            "retrying chunk after error: {error}"
        );
        tokio::select! {
            biased;
            _ = self.options.cancellation.cancelled() => Err(UploadError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Applies the service response for `pending`, returning what is left to
    /// send.
    fn advance(&mut self, pending: Chunk, status: TransmitStatus) -> Result<Progress> {
        let persisted = match status {
            TransmitStatus::Finalized(object) if pending.is_final() => {
                self.persisted = pending.end();
                return Ok(Progress::Done(Some(object)));
            }
            TransmitStatus::Finalized(object) => {
                return Err(UploadError::UnexpectedFinalization {
                    sent: pending.end(),
                    object,
                });
            }
            TransmitStatus::Partial(persisted) => persisted,
        };
        // `pending` always starts at the last persisted size reported by the
        // service.
        if persisted < pending.offset() {
            return Err(UploadError::UnexpectedRewind {
                offset: pending.offset(),
                persisted,
            });
        }
        if persisted > pending.end() {
            return Err(UploadError::TooMuchProgress {
                sent: pending.end(),
                persisted,
            });
        }
        self.persisted = persisted;
        if persisted == pending.end() && !pending.is_final() {
            return Ok(Progress::Done(None));
        }
        Ok(Progress::Pending(pending.resume_from(persisted)))
    }

    /// Runs one request, bounded by the attempt timeout and the cancellation
    /// token.
    async fn attempt<T, F>(&self, call: F) -> std::result::Result<T, Interrupted>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        let timed = async {
            match self.options.attempt_timeout {
                None => call.await,
                Some(t) => tokio::time::timeout(t, call)
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Timeout(t))),
            }
        };
        tokio::select! {
            biased;
            _ = self.options.cancellation.cancelled() => Err(Interrupted::Cancelled),
            r = timed => r.map_err(Interrupted::Failed),
        }
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("chunk_size", &self.options.chunk_size)
            .field("buffer", &self.buffer)
            .field("persisted", &self.persisted)
            .finish()
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SessionState::Active | SessionState::Finalizing
        ) {
            tracing::warn!(
                upload = %self.target,
                consumed = self.buffer.consumed(),
                "upload session dropped before close() or abort(), the object was not created"
            );
        }
    }
}
