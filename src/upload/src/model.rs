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

//! Types describing the destination and the result of an upload.

use crate::error::UploadError;
use std::collections::BTreeMap;

/// The bucket and object name receiving an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    bucket: String,
    object: String,
}

impl UploadTarget {
    /// Creates a target, the names are validated when the session is created.
    ///
    /// # Example
    /// ```
    /// # use pipeline_upload::model::UploadTarget;
    /// let target = UploadTarget::new("my-bucket", "path/to/object.csv");
    /// assert_eq!(target.to_string(), "gs://my-bucket/path/to/object.csv");
    /// ```
    pub fn new<B, O>(bucket: B, object: O) -> Self
    where
        B: Into<String>,
        O: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub(crate) fn validate(&self) -> Result<(), UploadError> {
        if self.bucket.is_empty() {
            return Err(UploadError::InvalidTarget("the bucket name is empty"));
        }
        if self.bucket.contains('/') {
            return Err(UploadError::InvalidTarget(
                "the bucket name cannot contain '/'",
            ));
        }
        if self.object.is_empty() {
            return Err(UploadError::InvalidTarget("the object name is empty"));
        }
        Ok(())
    }
}

impl std::fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)
    }
}

/// Metadata sent when the upload session is created.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ObjectMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_content_type<T: Into<String>>(mut self, v: T) -> Self {
        self.content_type = Some(v.into());
        self
    }

    pub fn set_metadata<I, K, V>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata = v.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }
}

/// The object created by a finalized upload.
///
/// Cloud Storage encodes 64-bit integers as JSON strings, the `size` and
/// `generation` fields accept either representation.
#[serde_with::serde_as]
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct UploadedObject {
    pub bucket: String,
    pub name: String,
    #[serde_as(as = "serde_with::PickFirst<(_, serde_with::DisplayFromStr)>")]
    pub size: u64,
    #[serde_as(as = "serde_with::PickFirst<(_, serde_with::DisplayFromStr)>")]
    pub generation: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc32c: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_link: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl UploadedObject {
    /// The `gs://` URI for this object.
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    type Result = anyhow::Result<()>;

    #[test_case("", "obj")]
    #[test_case("bucket", "")]
    #[test_case("bucket/with/slash", "obj")]
    fn invalid_target(bucket: &str, object: &str) {
        let target = UploadTarget::new(bucket, object);
        let err = target.validate().unwrap_err();
        assert!(matches!(err, UploadError::InvalidTarget(_)), "{err:?}");
    }

    #[test]
    fn valid_target() -> Result {
        let target = UploadTarget::new("bucket", "a/b/c.csv");
        target.validate()?;
        assert_eq!(target.bucket(), "bucket");
        assert_eq!(target.object(), "a/b/c.csv");
        assert_eq!(target.to_string(), "gs://bucket/a/b/c.csv");
        Ok(())
    }

    #[test]
    fn metadata_setters() {
        let metadata = ObjectMetadata::new()
            .set_content_type("text/csv")
            .set_metadata([("k0", "v0"), ("k1", "v1")]);
        assert_eq!(metadata.content_type.as_deref(), Some("text/csv"));
        assert_eq!(metadata.metadata.get("k1").map(String::as_str), Some("v1"));
    }

    #[test]
    fn deserialize_object() -> Result {
        let object: UploadedObject = serde_json::from_value(serde_json::json!({
            "bucket": "bucket",
            "name": "data-2024-03-01.csv",
            "size": "1234",
            "generation": "1700000000000001",
            "contentType": "text/csv",
            "crc32c": "AAAAAA==",
            "metadata": {"source": "url"},
            "kind": "storage#object"
        }))?;
        assert_eq!(object.size, 1234);
        assert_eq!(object.generation, 1700000000000001);
        assert_eq!(object.content_type.as_deref(), Some("text/csv"));
        assert_eq!(object.uri(), "gs://bucket/data-2024-03-01.csv");
        assert_eq!(
            object.metadata.get("source").map(String::as_str),
            Some("url")
        );
        Ok(())
    }

    #[test]
    fn deserialize_numeric_size() -> Result {
        let object: UploadedObject =
            serde_json::from_value(serde_json::json!({"bucket": "b", "name": "o", "size": 8}))?;
        assert_eq!(object.size, 8);
        assert_eq!(object.generation, 0);
        Ok(())
    }
}
