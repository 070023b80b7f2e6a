use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    File,
    Folder,
    Root,
}

impl ItemType {
    pub fn is_folder(self) -> bool {
        matches!(self, ItemType::Folder | ItemType::Root)
    }
}

/// Property bundle of a file or folder as returned by the service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date_created: Option<i64>,
    #[serde(default)]
    pub date_meta_last_modified: Option<i64>,
    #[serde(default)]
    pub date_content_last_modified: Option<i64>,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub is_mirrored: Option<bool>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub blocklist_key: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub blocklist_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub application_data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ShareInfo {
    pub share_key: String,
    #[serde(default)]
    pub share_type: Option<String>,
    #[serde(default)]
    pub share_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub short_url: Option<String>,
    #[serde(default)]
    pub share_size: Option<u64>,
    #[serde(default)]
    pub date_created: Option<i64>,
}

/// Changes accepted by the share info endpoint.
#[derive(Debug, Clone, Default)]
pub struct ShareUpdate<'a> {
    pub current_password: Option<&'a str>,
    pub password: Option<&'a str>,
    pub name: Option<&'a str>,
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|err| Error::UnexpectedResponse(err.to_string()))
}

/// The `meta` object of a response, or the response itself.
pub(crate) fn meta_of(mut value: Value) -> Value {
    match value.get_mut("meta") {
        Some(meta) if meta.is_object() => meta.take(),
        _ => value,
    }
}

/// The `items` array of a response.
pub(crate) fn items_of(mut value: Value) -> Result<Value, Error> {
    if value.is_array() {
        return Ok(value);
    }
    match value.get_mut("items") {
        Some(items) => Ok(items.take()),
        None => Err(Error::UnexpectedResponse(
            "response is missing `items`".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_file_metadata() {
        let meta: Metadata = decode(json!({
            "id": "abc",
            "parent_id": "root",
            "type": "file",
            "name": "report.pdf",
            "version": 3,
            "size": 42,
            "mime": "application/pdf",
            "extension": "pdf",
            "application_data": {"k": "v"}
        }))
        .unwrap();
        assert_eq!(meta.item_type, ItemType::File);
        assert_eq!(meta.size, Some(42));
        assert_eq!(meta.version, 3);
        assert_eq!(meta.application_data.unwrap()["k"], "v");
    }

    #[test]
    fn root_counts_as_folder() {
        let meta: Metadata = decode(json!({"id": "", "type": "root"})).unwrap();
        assert!(meta.item_type.is_folder());
    }

    #[test]
    fn unwraps_meta_and_items() {
        assert_eq!(meta_of(json!({"meta": {"id": "a"}})), json!({"id": "a"}));
        assert_eq!(meta_of(json!({"id": "a"})), json!({"id": "a"}));
        assert_eq!(items_of(json!({"items": [1]})).unwrap(), json!([1]));
        assert!(items_of(json!({})).is_err());
    }

    #[test]
    fn missing_type_is_unexpected() {
        let err = decode::<Metadata>(json!({"id": "a"})).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }
}
