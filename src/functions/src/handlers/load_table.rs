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

use super::{Failure, HandlerResult, Pipeline};
use crate::bigquery::LoadRequest;
use crate::event::{self, LoadEvent};
use crate::storage::parse_gs_uri;

/// Loads the object named in a [LoadEvent] into a warehouse table.
pub async fn load_uri_to_warehouse(pipeline: &Pipeline, raw: &[u8]) -> HandlerResult {
    let event = event::decode::<LoadEvent>(raw)
        .map_err(|e| Failure::new("Error getting the variables from Pub/Sub", e))?;
    parse_gs_uri(&event.uri)
        .map_err(|e| Failure::new(format!("Error reading the file uri: {}", event.uri), e))?;

    let table = format!("{}.{}", event.dataset, event.table);
    let request = LoadRequest {
        uri: event.uri,
        dataset: event.dataset,
        table: event.table,
        write_mode: event.write_mode,
        schema: event.schema,
        skip_rows: event.skip_rows,
    };
    let rows = pipeline
        .loader()
        .load_from_uri(&request)
        .await
        .map_err(|e| {
            Failure::new(
                format!("Error loading file {} into table {table}", request.uri),
                e,
            )
        })?;
    Ok(format!("Loaded {rows} rows from {} into {table}", request.uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::bigquery::{MockWarehouseLoader, WriteMode};
    use crate::handlers::tests::{event, test_pipeline};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    type Result = anyhow::Result<()>;

    #[tokio::test]
    async fn success() -> Result {
        let mut loader = MockWarehouseLoader::new();
        loader.expect_load_from_uri().times(1).returning(|request| {
            assert_eq!(request.uri, "gs://test-bucket/raw/data.csv");
            assert_eq!(request.dataset, "staging");
            assert_eq!(request.table, "daily");
            assert_eq!(request.write_mode, WriteMode::Overwrite);
            assert_eq!(request.skip_rows, 1);
            Ok(42)
        });
        let pipeline = test_pipeline().with_loader(loader);
        let raw = event(json!({
            "uri": "gs://test-bucket/raw/data.csv",
            "dataset": "staging",
            "table": "daily",
            "write_mode": "overwrite",
            "skip_rows": 1,
        }));
        let got = load_uri_to_warehouse(&pipeline, &raw).await?;
        assert_eq!(
            got,
            "Loaded 42 rows from gs://test-bucket/raw/data.csv into staging.daily"
        );
        Ok(())
    }

    #[tokio::test]
    async fn bad_uri() -> Result {
        let pipeline = test_pipeline();
        let raw = event(json!({
            "uri": "https://example.com/data.csv",
            "dataset": "staging",
            "table": "daily",
        }));
        let err = load_uri_to_warehouse(&pipeline, &raw).await.unwrap_err();
        assert!(matches!(err.source, Error::InvalidUri(_)), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn load_error() -> Result {
        let mut loader = MockWarehouseLoader::new();
        loader.expect_load_from_uri().times(1).returning(|_| {
            Err(Error::LoadJob {
                job_id: "job-123".into(),
                reason: "invalid: bad CSV row".into(),
            })
        });
        let pipeline = test_pipeline().with_loader(loader);
        let raw = event(json!({
            "uri": "gs://test-bucket/raw/data.csv",
            "dataset": "staging",
            "table": "daily",
        }));
        let err = load_uri_to_warehouse(&pipeline, &raw).await.unwrap_err();
        assert_eq!(
            err.notification,
            "Error loading file gs://test-bucket/raw/data.csv into table staging.daily"
        );
        Ok(())
    }
}
