//! JSON resources of the storage API.
//!
//! Only the commonly used fields are modeled. The API encodes 64-bit integers as strings, which
//! is preserved here; see the accessor methods for parsed values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Object metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Object {
    pub id: Option<String>,
    pub name: String,
    pub bucket: String,
    pub generation: Option<String>,
    pub metageneration: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<String>,
    pub md5_hash: Option<String>,
    pub crc32c: Option<String>,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub media_link: Option<String>,
    pub self_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Object {
    /// Returns the content length in bytes.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref()?.parse().ok()
    }

    /// Returns the object generation.
    pub fn generation_number(&self) -> Option<i64> {
        self.generation.as_deref()?.parse().ok()
    }
}

/// A page of objects.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectList {
    pub items: Vec<Object>,
    /// Common prefixes when listing with a delimiter.
    pub prefixes: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Bucket metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Bucket {
    pub id: Option<String>,
    pub name: String,
    pub project_number: Option<String>,
    pub location: Option<String>,
    pub storage_class: Option<String>,
    pub etag: Option<String>,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub self_link: Option<String>,
}

/// A page of buckets.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BucketList {
    pub items: Vec<Bucket>,
    pub next_page_token: Option<String>,
}

/// An access control entry, either on a bucket or a default for new objects.
///
/// `entity` takes forms such as `user-alice@example.com`, `group-devs@example.com`,
/// `project-owners-1234` or `allUsers`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessControl {
    pub id: Option<String>,
    pub bucket: Option<String>,
    pub entity: String,
    pub role: String,
    pub email: Option<String>,
    pub entity_id: Option<String>,
    pub domain: Option<String>,
    pub etag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AccessControlList {
    pub items: Vec<AccessControl>,
}

/// A notification channel.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object() {
        let object: Object = serde_json::from_str(
            r#"{
                "kind": "storage#object",
                "id": "bucket/dir/file.txt/1712345678901234",
                "name": "dir/file.txt",
                "bucket": "bucket",
                "generation": "1712345678901234",
                "contentType": "text/plain",
                "size": "7",
                "md5Hash": "f2qKjZ7Nzc4y0mPgIPhCFA==",
                "metadata": {"owner": "alice"}
            }"#,
        )
        .unwrap();

        assert_eq!(object.name, "dir/file.txt");
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(object.size_bytes(), Some(7));
        assert_eq!(object.generation_number(), Some(1712345678901234));
        assert_eq!(object.metadata.unwrap()["owner"], "alice");
    }

    #[test]
    fn serializes_channel_type() {
        let channel = Channel {
            id: "channel-1".into(),
            resource_id: "resource-1".into(),
            kind: Some("web_hook".into()),
            ..Default::default()
        };

        let json = serde_json::to_value(&channel).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "channel-1", "resourceId": "resource-1", "type": "web_hook"})
        );
    }
}
