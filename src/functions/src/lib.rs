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

//! Serverless functions for a cloud data pipeline.
//!
//! Each function is triggered by a Pub/Sub message. The functions copy files
//! from public URLs into Cloud Storage, optionally streaming them through a
//! resumable upload, and load Cloud Storage objects into BigQuery. The
//! outcome of each event is logged and published to a notification topic.
//!
//! The collaborators (object store, notifier, warehouse loader) are traits,
//! the production implementations share one [Context][context::Context].
//!
//! [FirestoreClient][firestore::FirestoreClient] and
//! [TransferClient][transfer::TransferClient] are not used by any handler.
//! They are library clients for jobs that maintain pipeline state or trigger
//! scheduled queries, built on the same `Context`:
//!
//! ```no_run
//! # use pipeline_functions::config::Config;
//! # use pipeline_functions::context::Context;
//! use pipeline_functions::firestore::{FirestoreClient, Query};
//! use pipeline_functions::transfer::TransferClient;
//! # async fn sample() -> pipeline_functions::Result<()> {
//! let context = Context::builder(Config::from_env()?).build().await?;
//! let firestore = FirestoreClient::new(context.clone());
//! let pending = firestore.query_collection("loads", &Query::All).await?;
//! println!("{} pending loads", pending.len());
//! let deleted = firestore.delete_collection("loads", 100).await?;
//! println!("deleted {deleted} documents");
//!
//! let transfer = TransferClient::new(context);
//! let run = transfer
//!     .start_manual_run("projects/my-project/locations/us/transferConfigs/my-config")
//!     .await?;
//! println!("{run}");
//! # Ok(()) }
//! ```

pub mod bigquery;
pub mod boundary;
pub mod config;
pub mod context;
pub mod date_tokens;
mod error;
pub mod event;
pub mod firestore;
pub mod handlers;
pub mod pubsub;
pub mod storage;
pub mod transfer;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) fn enable_tracing() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::fmt::format::FmtSpan;
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}
