use crate::namespace::Timestamped;
use serde::{Deserialize, Serialize};

/// A snippet handed to the playground through a short-lived id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedCodeEntry {
    pub id: String,
    pub language_id: String,
    pub code: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Timestamped for SharedCodeEntry {
    fn timestamp_ms(&self) -> i64 {
        self.created_at
    }
}

/// Input to `SharingStore::put`; the store assigns id and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewSharedCode {
    pub language_id: String,
    pub code: String,
    pub function_name: Option<String>,
    pub description: Option<String>,
}

impl NewSharedCode {
    pub fn new(language_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language_id: language_id.into(),
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub(crate) fn into_entry(self, id: String, created_at: i64) -> SharedCodeEntry {
        SharedCodeEntry {
            id,
            language_id: self.language_id,
            code: self.code,
            created_at,
            function_name: self.function_name,
            description: self.description,
        }
    }
}

/// A user's in-progress edit of a shared snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCodeEntry {
    pub code: String,
    pub language_id: String,
    pub saved_at: i64,
}

impl Timestamped for PersistedCodeEntry {
    fn timestamp_ms(&self) -> i64 {
        self.saved_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCode {
    pub code: String,
    pub language_id: String,
}

impl From<PersistedCodeEntry> for PersistedCode {
    fn from(entry: PersistedCodeEntry) -> Self {
        Self {
            code: entry.code,
            language_id: entry.language_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_entry_wire_format() {
        let entry = NewSharedCode::new("javascript", "x").into_entry("abc".into(), 1_700_000_000_000);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "abc",
                "languageId": "javascript",
                "code": "x",
                "createdAt": 1_700_000_000_000i64
            })
        );

        let with_meta: SharedCodeEntry = serde_json::from_str(
            r#"{"id":"a","languageId":"python","code":"pass","createdAt":1,"functionName":"main"}"#,
        )
        .unwrap();
        assert_eq!(with_meta.function_name.as_deref(), Some("main"));
        assert_eq!(with_meta.description, None);
    }
}
