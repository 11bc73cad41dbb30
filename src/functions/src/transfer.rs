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

use crate::Result;
use crate::context::Context;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

// Manual runs are requested slightly in the future.
const RUN_DELAY_SECONDS: i64 = 10;

/// Starts runs of BigQuery scheduled queries.
#[derive(Clone, Debug)]
pub struct TransferClient {
    context: Context,
}

impl TransferClient {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Starts a manual run of a transfer configuration.
    ///
    /// The resource name has the form
    /// `projects/{project}/locations/{location}/transferConfigs/{config}`,
    /// as shown in the configuration tab of the scheduled query.
    pub async fn start_manual_run(&self, resource_name: &str) -> Result<serde_json::Value> {
        self.start_manual_run_at(resource_name, Utc::now()).await
    }

    async fn start_manual_run_at(
        &self,
        resource_name: &str,
        now: DateTime<Utc>,
    ) -> Result<serde_json::Value> {
        tracing::info!("running scheduled query {resource_name}");
        let url = format!(
            "{}/v1/{}:startManualRuns",
            self.context.config().endpoints.transfer.trim_end_matches('/'),
            resource_name.trim_start_matches('/'),
        );
        let run_time = now + TimeDelta::seconds(RUN_DELAY_SECONDS);
        let body = serde_json::json!({
            "requestedRunTime": run_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        let builder = self.context.http().post(url).json(&body);
        self.context.send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use httptest::{Expectation, Server, all_of, matchers::*, responders::*};
    use serde_json::json;

    type Result = anyhow::Result<()>;

    const CONFIG: &str = "projects/123/locations/europe-west2/transferConfigs/abc-123";

    #[tokio::test]
    async fn start_manual_run() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path(
                    "POST",
                    "/v1/projects/123/locations/europe-west2/transferConfigs/abc-123:startManualRuns"
                ),
                request::body(json_decoded(eq(json!({
                    "requestedRunTime": "2024-03-01T12:00:10Z"
                })))),
            ])
            .respond_with(json_encoded(json!({"runs": [{"name": "run-1"}]}))),
        );
        let client = TransferClient::new(test_context(&server));
        let now = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")?.with_timezone(&Utc);
        let response = client.start_manual_run_at(CONFIG, now).await?;
        assert_eq!(response["runs"][0]["name"], "run-1");
        Ok(())
    }

    #[tokio::test]
    async fn start_manual_run_error() -> Result {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("POST"))
                .respond_with(status_code(403).body("permission denied")),
        );
        let client = TransferClient::new(test_context(&server));
        let err = client.start_manual_run(CONFIG).await.unwrap_err();
        assert_eq!(err.http_status_code(), Some(403), "{err:?}");
        Ok(())
    }
}
