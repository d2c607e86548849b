//! Google Sheets as a row store, via the v4 values API.

use async_trait::async_trait;
use batchrun_core::{CellAddress, RowRange};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;
use crate::gcs::check_status;
use crate::rows::RowStore;

const DEFAULT_ENDPOINT: &str = "https://sheets.googleapis.com";

/// Request/response body of the values endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl ValueRange {
    /// Cells rendered as strings; numbers and booleans use their JSON form.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect()
    }
}

/// One spreadsheet, read and written with a bearer token.
#[derive(Debug, Clone)]
pub struct SheetsRowStore {
    inner: reqwest::Client,
    endpoint: String,
    spreadsheet_id: String,
    token: Option<String>,
}

impl SheetsRowStore {
    pub fn new(spreadsheet_id: impl Into<String>, token: Option<String>) -> Self {
        Self {
            inner: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            token,
        }
    }

    /// Point at another endpoint (emulators, proxies).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// URL of the values resource for an A1 range.
    pub fn values_url(&self, a1_range: &str) -> Result<Url, StorageError> {
        let mut url =
            Url::parse(&self.endpoint).map_err(|e| StorageError::InvalidLocation(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidLocation(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", a1_range]);
        Ok(url)
    }

    /// Body of a single-row RAW update.
    pub fn update_body(a1_range: &str, fields: &[String]) -> ValueRange {
        ValueRange {
            range: Some(a1_range.to_string()),
            major_dimension: Some("ROWS".to_string()),
            values: vec![fields.iter().cloned().map(Value::String).collect()],
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn context(&self, a1_range: &str) -> String {
        format!("sheets://{}/{}", self.spreadsheet_id, a1_range)
    }
}

#[async_trait]
impl RowStore for SheetsRowStore {
    async fn read(&self, range: &RowRange) -> Result<Vec<Vec<String>>, StorageError> {
        let a1 = range.to_string();
        let mut url = self.values_url(&a1)?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        debug!(url = %url, "GET values");

        let response = self.authorize(self.inner.get(url)).send().await?;
        let response = check_status(response, self.context(&a1)).await?;
        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(body.into_rows())
    }

    async fn write(&self, address: &CellAddress, fields: &[String]) -> Result<(), StorageError> {
        let a1 = address.span(fields.len());
        let mut url = self.values_url(&a1)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        debug!(url = %url, fields = fields.len(), "PUT values");

        let body = Self::update_body(&a1, fields);
        let response = self
            .authorize(self.inner.put(url).json(&body))
            .send()
            .await?;
        check_status(response, self.context(&a1)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_url() {
        let store = SheetsRowStore::new("sheet-123", None);
        let url = store.values_url("'Q3 leads'!A1:A20").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'Q3%20leads'!A1:A20"
        );
    }

    #[test]
    fn test_update_body() {
        let body = SheetsRowStore::update_body("C5:E5", &["yes".into(), "anvils".into()]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            json!({"range": "C5:E5", "majorDimension": "ROWS", "values": [["yes", "anvils"]]})
        );
    }

    #[test]
    fn test_into_rows() {
        let body: ValueRange = serde_json::from_value(json!({
            "range": "Sheet1!A1:A4",
            "majorDimension": "ROWS",
            "values": [["company"], ["Acme"], [], [42]]
        }))
        .unwrap();
        assert_eq!(
            body.into_rows(),
            vec![
                vec!["company".to_string()],
                vec!["Acme".to_string()],
                vec![],
                vec!["42".to_string()],
            ]
        );
    }

    #[test]
    fn test_missing_values_is_empty() {
        let body: ValueRange = serde_json::from_value(json!({"range": "A1:A4"})).unwrap();
        assert!(body.into_rows().is_empty());
    }
}
