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

use crate::config::Config;
use crate::{Error, Result};
use google_cloud_auth::credentials::{CacheableResource, Credentials};
use http::Extensions;
use serde::de::DeserializeOwned;

/// The HTTP client, credentials and configuration shared by the collaborators.
///
/// Each collaborator keeps a clone. Clones share the connection pool and the
/// credentials cache.
///
/// # Example
/// ```no_run
/// # use pipeline_functions::{config::Config, context::Context};
/// # async fn sample() -> anyhow::Result<()> {
/// let context = Context::builder(Config::from_env()?).build().await?;
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct Context {
    http: reqwest::Client,
    credentials: Credentials,
    config: Config,
}

impl Context {
    pub fn builder(config: Config) -> ContextBuilder {
        ContextBuilder::new(config)
    }

    pub fn new(http: reqwest::Client, credentials: Credentials, config: Config) -> Self {
        Self {
            http,
            credentials,
            config,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adds the authentication headers to `builder`.
    pub(crate) async fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        let cached = self
            .credentials
            .headers(Extensions::new())
            .await
            .map_err(Error::authentication)?;
        match cached {
            CacheableResource::New { data, .. } => Ok(builder.headers(data)),
            CacheableResource::NotModified => Err(Error::authentication(
                "the credentials returned cached headers for an uncached request",
            )),
        }
    }

    /// Authorizes and sends a request, converting error statuses into errors.
    pub(crate) async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let builder = self.authorized(builder).await?;
        let response = builder.send().await.map_err(Error::io)?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        Ok(response)
    }

    /// Like [send][Context::send], parsing the response body as JSON.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self.send(builder).await?;
        response.json::<T>().await.map_err(Error::deser)
    }
}

/// Configures a [Context].
#[derive(Clone, Debug)]
pub struct ContextBuilder {
    config: Config,
    credentials: Option<Credentials>,
    http: Option<reqwest::Client>,
}

impl ContextBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            credentials: None,
            http: None,
        }
    }

    /// Sets the credentials, defaults to the Application Default Credentials.
    pub fn with_credentials<V: Into<Credentials>>(mut self, v: V) -> Self {
        self.credentials = Some(v.into());
        self
    }

    pub fn with_client(mut self, v: reqwest::Client) -> Self {
        self.http = Some(v);
        self
    }

    pub async fn build(self) -> Result<Context> {
        let credentials = match self.credentials {
            Some(c) => c,
            None => google_cloud_auth::credentials::Builder::default()
                .build()
                .map_err(Error::authentication)?,
        };
        let http = match self.http {
            Some(c) => c,
            None => reqwest::Client::builder().build().map_err(Error::io)?,
        };
        Ok(Context::new(http, credentials, self.config))
    }
}
