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

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// A FIFO of written bytes waiting to be cut into chunks.
///
/// Writes append [Bytes] without copying. Reads split the front buffers and
/// only copy when a read spans more than one write.
#[derive(Default)]
pub(crate) struct ChunkBuffer {
    parts: VecDeque<Bytes>,
    buffered: usize,
    consumed: u64,
}

impl ChunkBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.buffered += data.len();
        self.parts.push_back(data);
    }

    /// Bytes written but not yet read.
    pub(crate) fn len(&self) -> usize {
        self.buffered
    }

    /// Total bytes read from the buffer since it was created.
    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Removes and returns up to `max` bytes from the front of the buffer.
    pub(crate) fn read(&mut self, max: usize) -> Bytes {
        let want = max.min(self.buffered);
        let mut pieces = Vec::new();
        let mut remaining = want;
        while remaining > 0 {
            let Some(mut front) = self.parts.pop_front() else {
                break;
            };
            if front.len() > remaining {
                let rest = front.split_off(remaining);
                self.parts.push_front(rest);
            }
            remaining -= front.len();
            pieces.push(front);
        }
        self.buffered -= want;
        self.consumed += want as u64;

        let mut pieces = pieces.into_iter();
        match (pieces.next(), pieces.len()) {
            (None, _) => Bytes::new(),
            (Some(first), 0) => first,
            (Some(first), _) => {
                let mut joined = BytesMut::with_capacity(want);
                joined.extend_from_slice(&first);
                pieces.for_each(|p| joined.extend_from_slice(&p));
                joined.freeze()
            }
        }
    }
}

impl std::fmt::Debug for ChunkBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkBuffer")
            .field("parts", &self.parts.len())
            .field("buffered", &self.buffered)
            .field("consumed", &self.consumed)
            .finish()
    }
}
