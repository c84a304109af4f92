//! BigQuery REST implementation of [`RemoteTableStore`]
//!
//! Talks to `{api_endpoint}/bigquery/v2/projects/{project}/datasets/{dataset}/tables`.
//! Error bodies of the form `{"error": {"code", "message", "errors": [{"reason"}]}}`
//! are surfaced as [`StoreError::Api`], and row rejections reported by
//! `insertAll` as [`StoreError::RowsRejected`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::auth::TokenSource;
use crate::client::RemoteTableStore;
use crate::config::ChatLakeConfig;
use crate::error::{RowInsertError, StoreError};
use crate::types::{RemoteTable, Row, TableMetadata};

/// Page size of table listings
const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorReason {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReference,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowInsertError>,
}

/// REST client bound to one project/dataset
pub struct BigQueryClient {
    http: Client,
    tokens: TokenSource,
    project_id: String,
    dataset: String,
    tables_url: String,
}

impl BigQueryClient {
    /// Create a client for the configured dataset
    pub fn new(config: &ChatLakeConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let tokens = TokenSource::new(
            config.credentials.clone(),
            config.metadata_endpoint.clone(),
            http.clone(),
        );

        Ok(Self {
            http,
            tokens,
            project_id: config.project_id.clone(),
            dataset: config.dataset.clone(),
            tables_url: config.tables_url(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.tables_url, table)
    }

    /// Authorize and send a request, mapping non-success statuses to errors
    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let request = match self.tokens.authorization().await? {
            Some(header) => request.header(AUTHORIZATION, header),
            None => request,
        };

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        if response.status() == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate();
        }
        Err(api_error(response).await)
    }
}

/// Build a [`StoreError::Api`] from an error response
async fn api_error(response: Response) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => StoreError::Api {
            status: status.as_u16(),
            reason: body.error.errors.into_iter().find_map(|e| e.reason),
            message: body.error.message,
        },
        Err(_) => StoreError::Api {
            status: status.as_u16(),
            reason: None,
            message: if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                text
            },
        },
    }
}

#[async_trait]
impl RemoteTableStore for BigQueryClient {
    #[instrument(skip(self), fields(dataset = %self.dataset))]
    async fn list_tables(&self) -> Result<Vec<RemoteTable>, StoreError> {
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("maxResults", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .send(self.http.get(&self.tables_url).query(&query))
                .await?;
            let page: TableList = response.json().await?;

            tables.extend(page.tables.into_iter().map(|entry| RemoteTable {
                id: entry.table_reference.table_id,
                kind: entry.kind,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} tables in {}", tables.len(), self.dataset);
        Ok(tables)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        match self.send(self.http.get(self.table_url(table))).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_metadata(&self, table: &str) -> Result<TableMetadata, StoreError> {
        let response = self.send(self.http.get(self.table_url(table))).await?;
        match response.json::<Value>().await? {
            Value::Object(metadata) => Ok(metadata),
            other => Err(StoreError::Serialization(format!(
                "Table resource for {} is not an object: {}",
                table, other
            ))),
        }
    }

    async fn create_table(
        &self,
        table: &str,
        metadata: &TableMetadata,
    ) -> Result<(), StoreError> {
        let mut body = metadata.clone();
        body.insert(
            "tableReference".to_string(),
            json!({
                "projectId": self.project_id,
                "datasetId": self.dataset,
                "tableId": table,
            }),
        );

        self.send(self.http.post(&self.tables_url).json(&body))
            .await?;
        Ok(())
    }

    async fn set_metadata(
        &self,
        table: &str,
        metadata: &TableMetadata,
    ) -> Result<(), StoreError> {
        self.send(self.http.patch(self.table_url(table)).json(metadata))
            .await?;
        Ok(())
    }

    async fn delete_table(&self, table: &str, ignore_not_found: bool) -> Result<(), StoreError> {
        match self.send(self.http.delete(self.table_url(table))).await {
            Ok(_) => Ok(()),
            Err(e) if ignore_not_found && e.is_not_found() => {
                debug!("Table {} already gone", table);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        let body = json!({
            "rows": rows
                .iter()
                .map(|row| json!({ "insertId": Uuid::new_v4().to_string(), "json": row }))
                .collect::<Vec<_>>(),
        });

        let response = self
            .send(
                self.http
                    .post(format!("{}/insertAll", self.table_url(table)))
                    .json(&body),
            )
            .await?;
        let result: InsertAllResponse = response.json().await?;

        if result.insert_errors.is_empty() {
            Ok(())
        } else {
            warn!(
                "{} of {} rows rejected by {}",
                result.insert_errors.len(),
                rows.len(),
                table
            );
            Err(StoreError::RowsRejected(result.insert_errors))
        }
    }
}
