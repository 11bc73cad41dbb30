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

//! Manages documents in the default Firestore database.
//!
//! Fields are exchanged as plain JSON objects. The client converts them to
//! and from the typed values in the Firestore REST API, see
//! <https://cloud.google.com/firestore/docs/reference/rest/v1/Value>.

use crate::context::Context;
use crate::storage::PATH_SEGMENT;
use crate::{Error, Result};
use percent_encoding::utf8_percent_encode;
use serde_json::{Map, Value, json};

/// Selects documents in a collection.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    All,
    FieldEquals { field: String, value: Value },
}

/// A document and its fields, converted to plain JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// The full resource name.
    pub name: String,
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawDocument {
    name: String,
    fields: Map<String, Value>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListDocumentsResponse {
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RunQueryResponse {
    document: Option<RawDocument>,
}

/// A Firestore client over the REST API.
#[derive(Clone, Debug)]
pub struct FirestoreClient {
    context: Context,
}

impl FirestoreClient {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    fn endpoint(&self) -> &str {
        self.context
            .config()
            .endpoints
            .firestore
            .trim_end_matches('/')
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            self.endpoint(),
            utf8_percent_encode(&self.context.config().project_id, PATH_SEGMENT),
        )
    }

    /// Deletes every document in `collection`, `batch_size` documents at a
    /// time. Returns the number of deleted documents.
    pub async fn delete_collection(&self, collection: &str, batch_size: usize) -> Result<usize> {
        let url = format!(
            "{}/{}",
            self.documents_url(),
            utf8_percent_encode(collection, PATH_SEGMENT)
        );
        let page_size = batch_size.max(1).to_string();
        let mut deleted = 0_usize;
        let mut page_token: Option<String> = None;
        loop {
            let builder = self
                .context
                .http()
                .get(&url)
                .query(&[("pageSize", page_size.as_str())]);
            let builder = page_token
                .iter()
                .fold(builder, |b, t| b.query(&[("pageToken", t)]));
            let page = self
                .context
                .send_json::<ListDocumentsResponse>(builder)
                .await?;
            for document in &page.documents {
                tracing::debug!("deleting document {}", document.name);
                let builder = self
                    .context
                    .http()
                    .delete(format!("{}/v1/{}", self.endpoint(), document.name));
                self.context.send(builder).await?;
                deleted += 1;
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) if !page.documents.is_empty() => page_token = Some(t),
                _ => break,
            }
        }
        tracing::info!("deleted {deleted} documents from {collection}");
        Ok(deleted)
    }

    /// Creates or replaces the document `id` in `collection`.
    pub async fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<Document> {
        let url = format!(
            "{}/{}/{}",
            self.documents_url(),
            utf8_percent_encode(collection, PATH_SEGMENT),
            utf8_percent_encode(id, PATH_SEGMENT),
        );
        let body = json!({ "fields": encode_fields(fields) });
        let builder = self.context.http().patch(url).json(&body);
        let raw = self.context.send_json::<RawDocument>(builder).await?;
        into_document(raw)
    }

    /// Returns the documents in `collection` selected by `query`.
    pub async fn query_collection(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let mut structured = json!({ "from": [{ "collectionId": collection }] });
        if let Query::FieldEquals { field, value } = query {
            structured["where"] = json!({
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": encode_value(value),
                }
            });
        }
        let url = format!("{}:runQuery", self.documents_url());
        let body = json!({ "structuredQuery": structured });
        let builder = self.context.http().post(url).json(&body);
        let responses = self
            .context
            .send_json::<Vec<RunQueryResponse>>(builder)
            .await?;
        responses
            .into_iter()
            .filter_map(|r| r.document)
            .map(into_document)
            .collect()
    }
}

fn into_document(raw: RawDocument) -> Result<Document> {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Document(format!("invalid document name `{}`", raw.name)))?
        .to_string();
    let fields = decode_fields(&raw.fields)?;
    Ok(Document {
        name: raw.name,
        id,
        fields,
    })
}

fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
        .collect()
}

/// Converts plain JSON into a Firestore value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        // The REST API encodes 64-bit integers as strings.
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => {
            let values = values.iter().map(encode_value).collect::<Vec<_>>();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

/// Converts a Firestore value into plain JSON.
pub(crate) fn decode_value(value: &Value) -> Result<Value> {
    let invalid = || Error::Document(format!("unsupported value {value}"));
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(invalid());
    };
    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" | "geoPointValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| invalid())?,
            Value::Number(_) => inner.clone(),
            _ => return Err(invalid()),
        },
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|v| v.iter().map(decode_value).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            Value::Array(values)
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default();
            Value::Object(fields)
        }
        _ => return Err(invalid()),
    };
    Ok(decoded)
}
