use serde_json::{Map, Value};

/// Local edits waiting for the next save.
///
/// Scalar properties replace any earlier pending value; application data
/// accumulates key by key until the change set is cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    name: Option<String>,
    extension: Option<String>,
    mime: Option<String>,
    date_created: Option<i64>,
    date_meta_last_modified: Option<i64>,
    date_content_last_modified: Option<i64>,
    version: Option<i64>,
    application_data: Map<String, Value>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn date_created(&self) -> Option<i64> {
        self.date_created
    }

    pub fn date_meta_last_modified(&self) -> Option<i64> {
        self.date_meta_last_modified
    }

    pub fn date_content_last_modified(&self) -> Option<i64> {
        self.date_content_last_modified
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn application_data(&self) -> &Map<String, Value> {
        &self.application_data
    }

    pub(crate) fn set_name(&mut self, value: String) {
        self.name = Some(value);
    }

    pub(crate) fn set_extension(&mut self, value: String) {
        self.extension = Some(value);
    }

    pub(crate) fn set_mime(&mut self, value: String) {
        self.mime = Some(value);
    }

    pub(crate) fn set_date_created(&mut self, value: i64) {
        self.date_created = Some(value);
    }

    pub(crate) fn set_date_meta_last_modified(&mut self, value: i64) {
        self.date_meta_last_modified = Some(value);
    }

    pub(crate) fn set_date_content_last_modified(&mut self, value: i64) {
        self.date_content_last_modified = Some(value);
    }

    pub(crate) fn set_version(&mut self, value: i64) {
        self.version = Some(value);
    }

    pub(crate) fn merge_application_data(&mut self, delta: &Map<String, Value>) {
        for (key, value) in delta {
            self.application_data.insert(key.clone(), value.clone());
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Form fields for a metadata update. Version fields are added by the
    /// caller since they always travel with the request.
    pub(crate) fn to_form(&self) -> Result<Vec<(String, String)>, serde_json::Error> {
        let mut form = Vec::new();
        let scalars = [
            ("name", self.name.clone()),
            ("extension", self.extension.clone()),
            ("mime", self.mime.clone()),
            ("date_created", self.date_created.map(|v| v.to_string())),
            (
                "date_meta_last_modified",
                self.date_meta_last_modified.map(|v| v.to_string()),
            ),
            (
                "date_content_last_modified",
                self.date_content_last_modified.map(|v| v.to_string()),
            ),
        ];
        for (key, value) in scalars {
            if let Some(value) = value {
                form.push((key.to_string(), value));
            }
        }
        if !self.application_data.is_empty() {
            form.push((
                "application_data".to_string(),
                serde_json::to_string(&self.application_data)?,
            ));
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn application_data_accumulates_across_calls() {
        let mut changes = ChangeSet::default();
        changes.merge_application_data(&map(json!({"a": 1})));
        changes.merge_application_data(&map(json!({"b": 2, "a": 3})));
        assert_eq!(changes.application_data(), &map(json!({"a": 3, "b": 2})));
    }

    #[test]
    fn scalar_changes_replace() {
        let mut changes = ChangeSet::default();
        changes.set_name("one".into());
        changes.set_name("two".into());
        assert_eq!(changes.name(), Some("two"));
        assert!(!changes.is_empty());
        changes.clear();
        assert!(changes.is_empty());
    }

    #[test]
    fn form_serializes_application_data_as_json() {
        let mut changes = ChangeSet::default();
        changes.set_name("n".into());
        changes.set_date_created(5);
        changes.merge_application_data(&map(json!({"k": "v"})));
        let form = changes.to_form().unwrap();
        assert_eq!(
            form,
            vec![
                ("name".to_string(), "n".to_string()),
                ("date_created".to_string(), "5".to_string()),
                ("application_data".to_string(), r#"{"k":"v"}"#.to_string()),
            ]
        );
    }
}
