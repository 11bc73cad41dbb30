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

//! Decodes the Pub/Sub messages that trigger the handlers.
//!
//! Handlers accept two envelopes. A push delivery wraps the message in a
//! `message` field, a background function event carries the `data` field at
//! the top level. In both cases `data` is the base64 encoding of a JSON
//! object.

use crate::bigquery::{SchemaField, WriteMode};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_with::{base64::Base64, serde_as};

#[serde_as]
#[derive(Debug, serde::Deserialize)]
struct EncodedMessage {
    #[serde_as(as = "Base64")]
    data: Vec<u8>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum Envelope {
    Push { message: EncodedMessage },
    Background(EncodedMessage),
}

/// Decodes an envelope and parses its payload as `T`.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    let envelope = serde_json::from_slice::<Envelope>(raw).map_err(Error::event)?;
    let data = match envelope {
        Envelope::Push { message } => message.data,
        Envelope::Background(message) => message.data,
    };
    serde_json::from_slice::<T>(&data).map_err(Error::event)
}

/// Requests a file download from a URL into a bucket.
///
/// ```json
/// {
///   "source_file_name": "https://example.com/data-$DATEDIFF.csv",
///   "bucket_name": "bucket",
///   "destination_blob_name": "raw/data-$DATEISO.csv",
///   "datediff": 6
/// }
/// ```
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct FetchEvent {
    pub source_file_name: String,
    pub bucket_name: String,
    pub destination_blob_name: String,
    /// The number of days subtracted from today for `$DATEDIFF`.
    pub datediff: i64,
}

/// Requests a warehouse load from a Cloud Storage object.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct LoadEvent {
    pub uri: String,
    pub dataset: String,
    pub table: String,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub skip_rows: u32,
    /// Detects the schema from the data when missing.
    #[serde(default)]
    pub schema: Option<Vec<SchemaField>>,
}
