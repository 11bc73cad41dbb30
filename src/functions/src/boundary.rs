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

use crate::handlers::{Handler, Pipeline};

/// Runs `handler` on one event, reporting the outcome.
///
/// The outcome is logged and published to the output or error topic, when
/// configured. Failures are not returned: the trigger would redeliver the
/// event, and the handlers are not idempotent.
pub async fn run_handler(pipeline: &Pipeline, handler: Handler, raw: &[u8]) {
    let name = handler.name();
    match handler.run(pipeline, raw).await {
        Ok(message) => {
            tracing::info!(handler = name, "{message}");
            let topic = pipeline.config().output_topic.as_deref();
            notify(pipeline, topic, &message).await;
        }
        Err(failure) => {
            tracing::error!(handler = name, error = ?failure.source, "{failure}");
            let topic = pipeline.config().error_topic.as_deref();
            notify(pipeline, topic, &failure.notification).await;
        }
    }
}

async fn notify(pipeline: &Pipeline, topic: Option<&str>, message: &str) {
    let Some(topic) = topic else {
        tracing::debug!("no topic configured, dropping notification: {message}");
        return;
    };
    if let Err(e) = pipeline.notifier().publish(topic, message).await {
        tracing::warn!("cannot publish the notification to {topic}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::bigquery::MockWarehouseLoader;
    use crate::config::Config;
    use crate::handlers::tests::{event, test_pipeline};
    use crate::pubsub::MockNotifier;
    use serde_json::json;

    fn load_event() -> Vec<u8> {
        event(json!({
            "uri": "gs://test-bucket/raw/data.csv",
            "dataset": "staging",
            "table": "daily",
        }))
    }

    #[tokio::test]
    async fn success_notifies_output_topic() {
        let mut loader = MockWarehouseLoader::new();
        loader.expect_load_from_uri().returning(|_| Ok(3));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_publish()
            .times(1)
            .returning(|topic, message| {
                assert_eq!(topic, "ok-topic");
                assert!(message.starts_with("Loaded 3 rows"), "{message}");
                Ok("msg-1".to_string())
            });
        let pipeline = test_pipeline().with_loader(loader).with_notifier(notifier);
        run_handler(&pipeline, Handler::LoadTable, &load_event()).await;
    }

    #[tokio::test]
    async fn failure_notifies_error_topic() {
        let _guard = crate::enable_tracing();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_publish()
            .times(1)
            .returning(|topic, message| {
                assert_eq!(topic, "error-topic");
                assert_eq!(message, "Error getting the variables from Pub/Sub");
                Ok("msg-2".to_string())
            });
        let pipeline = test_pipeline().with_notifier(notifier);
        run_handler(&pipeline, Handler::FetchUrl, b"not an event").await;
    }

    #[tokio::test]
    async fn publish_errors_are_ignored() {
        let mut notifier = MockNotifier::new();
        notifier.expect_publish().times(1).returning(|_, _| {
            Err(Error::Http {
                status: 404,
                headers: http::HeaderMap::new(),
                payload: bytes::Bytes::from_static(b"topic not found"),
            })
        });
        let pipeline = test_pipeline().with_notifier(notifier);
        run_handler(&pipeline, Handler::StreamUrl, b"{}").await;
    }

    #[tokio::test]
    async fn no_topics_no_notifications() {
        let mut loader = MockWarehouseLoader::new();
        loader.expect_load_from_uri().returning(|_| Ok(3));
        // No expectations, any publish() call panics.
        let notifier = MockNotifier::new();
        let pipeline = crate::handlers::Pipeline::new(&test_only_context())
            .with_loader(loader)
            .with_notifier(notifier);
        run_handler(&pipeline, Handler::LoadTable, &load_event()).await;
    }

    fn test_only_context() -> crate::context::Context {
        crate::context::Context::new(
            reqwest::Client::new(),
            google_cloud_auth::credentials::anonymous::Builder::new().build(),
            Config::new("test-project"),
        )
    }
}
