use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::response::ResponseOutcome;

/// A row: column name to value. Values are untyped; the server validates them on write.
pub type Row = serde_json::Map<String, Value>;

/// A page of rows as returned by the query and get-all endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default)]
    pub start: u64,
    /// Page size cap.
    pub num: u64,
    /// Number of rows matched server-side.
    pub total: u64,
    #[serde(default)]
    pub items: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_href: Option<String>,
}

impl RowsResponse {
    /// True when the matched count is not strictly below the page cap.
    pub fn at_page_cap(&self) -> bool {
        self.total >= self.num
    }
}

/// The result of a write against one row of a batched update or delete.
#[derive(Debug)]
pub struct RowOutcome {
    pub row_id: String,
    pub result: Result<ResponseOutcome>,
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, Ok(ResponseOutcome::Success))
    }
}

/// Text form of a value as sent to the server. `None` for nulls.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(values) => Some(
            values
                .iter()
                .filter_map(value_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Pre-send normalization of a row payload: every value is converted to its text form and
/// entries whose text is empty or whitespace-only are dropped.
pub(crate) fn normalize_row(row: &Row) -> BTreeMap<String, String> {
    row.iter()
        .filter_map(|(column, value)| {
            value_text(value)
                .filter(|text| !text.trim().is_empty())
                .map(|text| (column.clone(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_normalize_row() {
        let row = json!({
            "id": "p1",
            "age": 26,
            "smoker": false,
            "notes": "   ",
            "nickname": "",
            "partner": null,
            "hobbies": ["chess", "go"],
        });
        let normalized = normalize_row(row.as_object().unwrap());

        assert_eq!(
            normalized,
            BTreeMap::from([
                ("age".to_string(), "26".to_string()),
                ("hobbies".to_string(), "chess,go".to_string()),
                ("id".to_string(), "p1".to_string()),
                ("smoker".to_string(), "false".to_string()),
            ])
        );
    }

    #[test]
    fn test_rows_response_page_cap() {
        let page: RowsResponse = serde_json::from_value(json!({
            "href": "/api/v1/Person",
            "start": 0,
            "num": 100,
            "total": 100,
            "items": [],
            "nextHref": "/api/v1/Person?start=100&num=100"
        }))
        .unwrap();

        assert!(page.at_page_cap());
        assert_eq!(
            page.next_href.as_deref(),
            Some("/api/v1/Person?start=100&num=100")
        );
    }
}
