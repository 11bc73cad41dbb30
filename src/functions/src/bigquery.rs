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

//! Loads Cloud Storage objects into BigQuery tables.
//!
//! Load jobs are asynchronous. The loader inserts the job and polls it until
//! it completes, or until the deadline expires.

use crate::context::Context;
use crate::storage::PATH_SEGMENT;
use crate::{Error, Result};
use percent_encoding::utf8_percent_encode;
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);

/// How the load treats existing rows in the destination table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replaces the table contents.
    Overwrite,
    /// Appends to the table contents.
    #[default]
    Append,
}

impl WriteMode {
    fn disposition(&self) -> &'static str {
        match self {
            Self::Overwrite => "WRITE_TRUNCATE",
            Self::Append => "WRITE_APPEND",
        }
    }
}

/// A column in the destination table.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// The parameters of a load job.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadRequest {
    pub uri: String,
    pub dataset: String,
    pub table: String,
    pub write_mode: WriteMode,
    /// Detects the schema from the data when `None`.
    pub schema: Option<Vec<SchemaField>>,
    pub skip_rows: u32,
}

/// Loads files into the data warehouse.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WarehouseLoader: std::fmt::Debug + Send + Sync {
    /// Runs a load job to completion, returns the number of loaded rows.
    async fn load_from_uri(&self, request: &LoadRequest) -> Result<u64>;
}

/// Runs BigQuery load jobs through the REST API.
#[derive(Clone, Debug)]
pub struct BigQueryLoader {
    context: Context,
    poll_interval: Duration,
    deadline: Duration,
}

impl BigQueryLoader {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Sets the time between job status queries.
    pub fn with_poll_interval(mut self, v: Duration) -> Self {
        self.poll_interval = v;
        self
    }

    /// Sets the maximum time waiting for a job.
    pub fn with_deadline(mut self, v: Duration) -> Self {
        self.deadline = v;
        self
    }

    fn jobs_url(&self) -> String {
        let config = self.context.config();
        format!(
            "{}/bigquery/v2/projects/{}/jobs",
            config.endpoints.bigquery.trim_end_matches('/'),
            utf8_percent_encode(&config.project_id, PATH_SEGMENT),
        )
    }

    async fn insert(&self, request: &LoadRequest) -> Result<Job> {
        let body = load_job_body(&self.context.config().project_id, request);
        let builder = self.context.http().post(self.jobs_url()).json(&body);
        self.context.send_json::<Job>(builder).await
    }

    async fn get(&self, reference: &JobReference) -> Result<Job> {
        let url = format!(
            "{}/{}",
            self.jobs_url(),
            utf8_percent_encode(&reference.job_id, PATH_SEGMENT)
        );
        let builder = reference
            .location
            .iter()
            .fold(self.context.http().get(url), |b, l| {
                b.query(&[("location", l)])
            });
        self.context.send_json::<Job>(builder).await
    }
}

#[async_trait::async_trait]
impl WarehouseLoader for BigQueryLoader {
    async fn load_from_uri(&self, request: &LoadRequest) -> Result<u64> {
        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut job = self.insert(request).await?;
        let reference = job.job_reference.clone();
        tracing::info!(
            "started load job {} for {} into {}.{}",
            reference.job_id,
            request.uri,
            request.dataset,
            request.table
        );
        while job.status.state != "DONE" {
            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(Error::LoadJob {
                    job_id: reference.job_id,
                    reason: format!("the job did not complete within {:?}", self.deadline),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            job = self.get(&reference).await?;
        }
        if let Some(e) = job.status.error_result {
            return Err(Error::LoadJob {
                job_id: reference.job_id,
                reason: format!("{}: {}", e.reason, e.message),
            });
        }
        let rows = job
            .statistics
            .load
            .map(|s| s.output_rows)
            .unwrap_or_default();
        tracing::info!("load job {} completed with {rows} rows", reference.job_id);
        Ok(rows)
    }
}

fn load_job_body(project_id: &str, request: &LoadRequest) -> serde_json::Value {
    let mut load = serde_json::json!({
        "sourceUris": [request.uri],
        "sourceFormat": "CSV",
        "destinationTable": {
            "projectId": project_id,
            "datasetId": request.dataset,
            "tableId": request.table,
        },
        "writeDisposition": request.write_mode.disposition(),
        "skipLeadingRows": request.skip_rows,
    });
    match &request.schema {
        Some(fields) => load["schema"] = serde_json::json!({ "fields": fields }),
        None => load["autodetect"] = serde_json::Value::Bool(true),
    }
    serde_json::json!({ "configuration": { "load": load } })
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: JobStatus,
    statistics: JobStatistics,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ErrorProto {
    reason: String,
    message: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[serde_as]
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LoadStatistics {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    output_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use httptest::{Expectation, Server, all_of, cycle, matchers::*, responders::*};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    type Result = anyhow::Result<()>;

    const JOBS: &str = "/bigquery/v2/projects/test-project/jobs";

    fn request() -> LoadRequest {
        LoadRequest {
            uri: "gs://bucket/raw/data.csv".into(),
            dataset: "staging".into(),
            table: "daily".into(),
            write_mode: WriteMode::Overwrite,
            schema: None,
            skip_rows: 1,
        }
    }

    fn job(state: &str) -> serde_json::Value {
        json!({
            "jobReference": {"projectId": "test-project", "jobId": "job-123", "location": "EU"},
            "status": {"state": state},
        })
    }

    fn test_loader(server: &Server) -> BigQueryLoader {
        BigQueryLoader::new(test_context(server))
            .with_poll_interval(Duration::from_millis(1))
            .with_deadline(Duration::from_secs(30))
    }

    #[test]
    fn body_autodetect() {
        let got = load_job_body("test-project", &request());
        let want = json!({"configuration": {"load": {
            "sourceUris": ["gs://bucket/raw/data.csv"],
            "sourceFormat": "CSV",
            "destinationTable": {
                "projectId": "test-project",
                "datasetId": "staging",
                "tableId": "daily",
            },
            "writeDisposition": "WRITE_TRUNCATE",
            "skipLeadingRows": 1,
            "autodetect": true,
        }}});
        assert_eq!(got, want);
    }

    #[test]
    fn body_schema() {
        let request = LoadRequest {
            write_mode: WriteMode::Append,
            schema: Some(vec![SchemaField {
                name: "count".into(),
                field_type: "INTEGER".into(),
                mode: None,
            }]),
            ..request()
        };
        let got = load_job_body("test-project", &request);
        let load = &got["configuration"]["load"];
        assert_eq!(load["writeDisposition"], "WRITE_APPEND");
        assert_eq!(
            load["schema"],
            json!({"fields": [{"name": "count", "type": "INTEGER"}]})
        );
        assert_eq!(load.get("autodetect"), None);
    }

    #[tokio::test]
    async fn load_polls_until_done() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", JOBS),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["configuration"]["load"]["sourceUris"] == json!(["gs://bucket/raw/data.csv"])
                })),
            ])
            .respond_with(json_encoded(job("PENDING"))),
        );
        let mut done = job("DONE");
        done["statistics"] = json!({"load": {"outputRows": "42"}});
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/bigquery/v2/projects/test-project/jobs/job-123"),
                request::query(url_decoded(contains(("location", "EU")))),
            ])
            .times(2)
            .respond_with(cycle![json_encoded(job("RUNNING")), json_encoded(done),]),
        );

        let rows = test_loader(&server).load_from_uri(&request()).await?;
        assert_eq!(rows, 42);
        Ok(())
    }

    #[tokio::test]
    async fn load_done_immediately() -> Result {
        let server = Server::run();
        let mut done = job("DONE");
        done["statistics"] = json!({"load": {"outputRows": 7}});
        server.expect(
            Expectation::matching(request::method_path("POST", JOBS))
                .respond_with(json_encoded(done)),
        );
        let rows = test_loader(&server).load_from_uri(&request()).await?;
        assert_eq!(rows, 7);
        Ok(())
    }

    #[tokio::test]
    async fn load_job_error() -> Result {
        let server = Server::run();
        let mut done = job("DONE");
        done["status"]["errorResult"] = json!({"reason": "invalid", "message": "bad CSV row"});
        server.expect(
            Expectation::matching(request::method_path("POST", JOBS))
                .respond_with(json_encoded(done)),
        );
        let err = test_loader(&server)
            .load_from_uri(&request())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, Error::LoadJob { job_id, reason } if job_id == "job-123" && reason.contains("bad CSV row")),
            "{err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn load_deadline() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", JOBS))
                .respond_with(json_encoded(job("RUNNING"))),
        );
        let loader = BigQueryLoader::new(test_context(&server))
            .with_poll_interval(Duration::from_secs(10))
            .with_deadline(Duration::from_secs(1));
        let err = loader.load_from_uri(&request()).await.unwrap_err();
        assert!(matches!(err, Error::LoadJob { .. }), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn insert_error() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", JOBS))
                .respond_with(status_code(404).body("dataset not found")),
        );
        let err = test_loader(&server)
            .load_from_uri(&request())
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), Some(404), "{err:?}");
        Ok(())
    }
}
