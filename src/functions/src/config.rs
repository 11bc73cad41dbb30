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

//! Function configuration, usually loaded from the environment.

use crate::{Error, Result};
use pipeline_upload::options::RESUMABLE_UPLOAD_QUANTUM;

pub const PROJECT_ID: &str = "PROJECT_ID";
pub const OUTPUT_TOPIC_NAME: &str = "OUTPUT_TOPIC_NAME";
pub const ERROR_TOPIC_NAME: &str = "ERROR_TOPIC_NAME";
pub const UPLOAD_CHUNK_SIZE: &str = "UPLOAD_CHUNK_SIZE";
pub const STORAGE_ENDPOINT: &str = "STORAGE_ENDPOINT";
pub const PUBSUB_ENDPOINT: &str = "PUBSUB_ENDPOINT";
pub const BIGQUERY_ENDPOINT: &str = "BIGQUERY_ENDPOINT";
pub const FIRESTORE_ENDPOINT: &str = "FIRESTORE_ENDPOINT";
pub const TRANSFER_ENDPOINT: &str = "TRANSFER_ENDPOINT";

/// The service endpoints used by the collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub storage: String,
    pub pubsub: String,
    pub bigquery: String,
    pub firestore: String,
    pub transfer: String,
}

impl Endpoints {
    /// Sends all requests to `endpoint`, useful with local emulators and in
    /// tests.
    pub fn uniform<T: Into<String>>(endpoint: T) -> Self {
        let endpoint = endpoint.into();
        Self {
            storage: endpoint.clone(),
            pubsub: endpoint.clone(),
            bigquery: endpoint.clone(),
            firestore: endpoint.clone(),
            transfer: endpoint,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            storage: pipeline_upload::gcs::DEFAULT_ENDPOINT.to_string(),
            pubsub: "https://pubsub.googleapis.com".to_string(),
            bigquery: "https://bigquery.googleapis.com".to_string(),
            firestore: "https://firestore.googleapis.com".to_string(),
            transfer: "https://bigquerydatatransfer.googleapis.com".to_string(),
        }
    }
}

/// The configuration shared by all handlers.
///
/// # Example
/// ```
/// # use pipeline_functions::config::Config;
/// let config = Config::new("my-project")
///     .with_output_topic("pipeline-ok")
///     .with_error_topic("pipeline-errors");
/// assert_eq!(config.project_id, "my-project");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub project_id: String,
    /// Receives a message after each successful event.
    pub output_topic: Option<String>,
    /// Receives a message after each failed event.
    pub error_topic: Option<String>,
    pub endpoints: Endpoints,
    pub upload_chunk_size: usize,
}

impl Config {
    pub fn new<T: Into<String>>(project_id: T) -> Self {
        Self {
            project_id: project_id.into(),
            output_topic: None,
            error_topic: None,
            endpoints: Endpoints::default(),
            upload_chunk_size: 8 * RESUMABLE_UPLOAD_QUANTUM,
        }
    }

    pub fn with_output_topic<T: Into<String>>(mut self, v: T) -> Self {
        self.output_topic = Some(v.into());
        self
    }

    pub fn with_error_topic<T: Into<String>>(mut self, v: T) -> Self {
        self.error_topic = Some(v.into());
        self
    }

    pub fn with_endpoints(mut self, v: Endpoints) -> Self {
        self.endpoints = v;
        self
    }

    pub fn with_upload_chunk_size(mut self, v: usize) -> Self {
        self.upload_chunk_size = v;
        self
    }

    /// Loads the configuration from the environment.
    ///
    /// `PROJECT_ID` is required. Empty values count as unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let project_id =
            get(PROJECT_ID).ok_or_else(|| Error::Config(format!("{PROJECT_ID} is not set")))?;
        let mut config = Self::new(project_id);
        config.output_topic = get(OUTPUT_TOPIC_NAME);
        config.error_topic = get(ERROR_TOPIC_NAME);

        let defaults = Endpoints::default();
        config.endpoints = Endpoints {
            storage: get(STORAGE_ENDPOINT).unwrap_or(defaults.storage),
            pubsub: get(PUBSUB_ENDPOINT).unwrap_or(defaults.pubsub),
            bigquery: get(BIGQUERY_ENDPOINT).unwrap_or(defaults.bigquery),
            firestore: get(FIRESTORE_ENDPOINT).unwrap_or(defaults.firestore),
            transfer: get(TRANSFER_ENDPOINT).unwrap_or(defaults.transfer),
        };
        if let Some(v) = get(UPLOAD_CHUNK_SIZE) {
            config.upload_chunk_size = v.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("{UPLOAD_CHUNK_SIZE}={v} is not a valid size: {e}"))
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scoped_env::ScopedEnv;
    use serial_test::serial;

    type Result = anyhow::Result<()>;

    #[test]
    #[serial]
    fn from_env_minimal() -> Result {
        let _p = ScopedEnv::set(PROJECT_ID, "test-project");
        let _o = ScopedEnv::remove(OUTPUT_TOPIC_NAME);
        let _e = ScopedEnv::remove(ERROR_TOPIC_NAME);
        let _s = ScopedEnv::remove(STORAGE_ENDPOINT);
        let _c = ScopedEnv::remove(UPLOAD_CHUNK_SIZE);
        let config = Config::from_env()?;
        assert_eq!(config, Config::new("test-project"));
        assert_eq!(config.endpoints, Endpoints::default());
        Ok(())
    }

    #[test]
    #[serial]
    fn from_env_full() -> Result {
        let _p = ScopedEnv::set(PROJECT_ID, "test-project");
        let _o = ScopedEnv::set(OUTPUT_TOPIC_NAME, "ok-topic");
        let _e = ScopedEnv::set(ERROR_TOPIC_NAME, "error-topic");
        let _s = ScopedEnv::set(STORAGE_ENDPOINT, "http://localhost:9000");
        let _b = ScopedEnv::set(BIGQUERY_ENDPOINT, "http://localhost:9050");
        let _c = ScopedEnv::set(UPLOAD_CHUNK_SIZE, "524288");
        let config = Config::from_env()?;
        assert_eq!(config.project_id, "test-project");
        assert_eq!(config.output_topic.as_deref(), Some("ok-topic"));
        assert_eq!(config.error_topic.as_deref(), Some("error-topic"));
        assert_eq!(config.endpoints.storage, "http://localhost:9000");
        assert_eq!(config.endpoints.bigquery, "http://localhost:9050");
        assert_eq!(config.endpoints.pubsub, Endpoints::default().pubsub);
        assert_eq!(config.upload_chunk_size, 524288);
        Ok(())
    }

    #[test]
    #[serial]
    fn from_env_missing_project() {
        let _p = ScopedEnv::remove(PROJECT_ID);
        let err = Config::from_env().unwrap_err();
        assert!(matches!(&err, Error::Config(m) if m.contains(PROJECT_ID)), "{err:?}");
    }

    #[test]
    fn empty_values_are_unset() -> Result {
        let config = Config::from_lookup(|name| match name {
            PROJECT_ID => Some("p".to_string()),
            OUTPUT_TOPIC_NAME => Some("  ".to_string()),
            _ => None,
        })?;
        assert_eq!(config.output_topic, None);
        Ok(())
    }

    #[test]
    fn bad_chunk_size() {
        let err = Config::from_lookup(|name| match name {
            PROJECT_ID => Some("p".to_string()),
            UPLOAD_CHUNK_SIZE => Some("lots".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(&err, Error::Config(m) if m.contains("lots")), "{err:?}");
    }

    #[test]
    fn uniform_endpoints() {
        let endpoints = Endpoints::uniform("http://127.0.0.1:8080");
        assert_eq!(endpoints.storage, "http://127.0.0.1:8080");
        assert_eq!(endpoints.transfer, "http://127.0.0.1:8080");
    }
}
