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

//! Publishes the pipeline notifications to Pub/Sub.

use crate::context::Context;
use crate::{Error, Result};
use percent_encoding::utf8_percent_encode;
use serde_with::{base64::Base64, serde_as};

/// Sends free-text notifications to a topic.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Notifier: std::fmt::Debug + Send + Sync {
    /// Publishes `message`, returns the id assigned by the service.
    async fn publish(&self, topic: &str, message: &str) -> Result<String>;
}

#[serde_as]
#[derive(serde::Serialize)]
struct PubsubMessage<'a> {
    #[serde_as(as = "Base64")]
    data: &'a [u8],
}

#[derive(serde::Serialize)]
struct PublishRequest<'a> {
    messages: [PubsubMessage<'a>; 1],
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publishes messages to topics in the configured project.
#[derive(Clone, Debug)]
pub struct PubsubPublisher {
    context: Context,
}

impl PubsubPublisher {
    pub fn new(context: Context) -> Self {
        Self { context }
    }
}

#[async_trait::async_trait]
impl Notifier for PubsubPublisher {
    async fn publish(&self, topic: &str, message: &str) -> Result<String> {
        let config = self.context.config();
        let url = format!(
            "{}/v1/projects/{}/topics/{}:publish",
            config.endpoints.pubsub.trim_end_matches('/'),
            utf8_percent_encode(&config.project_id, crate::storage::PATH_SEGMENT),
            utf8_percent_encode(topic, crate::storage::PATH_SEGMENT),
        );
        let request = PublishRequest {
            messages: [PubsubMessage {
                data: message.as_bytes(),
            }],
        };
        let builder = self.context.http().post(url).json(&request);
        let response = self.context.send_json::<PublishResponse>(builder).await?;
        let id = response
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| Error::deser("the publish response has no message ids"))?;
        tracing::debug!("published message {id} to {topic}");
        Ok(id)
    }
}
