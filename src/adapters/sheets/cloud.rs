//! Cloud spreadsheet sink
//!
//! Google Sheets v4 REST: one spreadsheet per export, one sheet per entity,
//! values written in fixed-size row chunks.

use crate::config::{RetryConfig, SecretString, SheetsConfig};
use crate::core::export::{with_retry, RetryPolicy};
use crate::core::transform::Table;
use crate::domain::{EntityKind, ExporterError, IsRetryable, Result};
use crate::logging::{LogAggregator, LogSource};
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
enum SheetsError {
    #[error("Sheets authorization failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Sheets rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Sheets unavailable: {0}")]
    Unavailable(String),
}

impl IsRetryable for SheetsError {
    fn is_retryable(&self) -> bool {
        matches!(self, SheetsError::Unavailable(_))
    }
}

impl From<SheetsError> for ExporterError {
    fn from(err: SheetsError) -> Self {
        ExporterError::SinkUnavailable(err.to_string())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
    spreadsheet_url: String,
}

/// Written spreadsheet location
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SpreadsheetLink {
    pub spreadsheet_id: String,
    pub url: String,
}

pub struct SheetsClient {
    http: Client,
    base_url: String,
    access_token: SecretString,
    title_prefix: String,
    rows_per_batch: usize,
    policy: RetryPolicy,
}

impl SheetsClient {
    /// # Errors
    ///
    /// Returns a configuration error if no access token is configured.
    pub fn new(config: &SheetsConfig) -> Result<Self> {
        let access_token = config.access_token.clone().ok_or_else(|| {
            ExporterError::Configuration("sheets.access_token not provided".to_string())
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ExporterError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
            title_prefix: config.title_prefix.clone(),
            rows_per_batch: config.rows_per_batch.max(1),
            policy: RetryPolicy::new(config.max_retries, &RetryConfig::default()),
        })
    }

    /// Replace the chunk retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Create a spreadsheet holding every table and return its URL
    ///
    /// # Errors
    ///
    /// Returns `SinkUnavailable` on any failed request, after chunk retries.
    pub async fn export(
        &self,
        tables: &[(EntityKind, Table)],
        events: &LogAggregator,
    ) -> Result<SpreadsheetLink> {
        let title = format!("{} {}", self.title_prefix, Utc::now().format("%Y-%m-%d %H:%M:%S"));
        let sheet_titles: Vec<String> = tables.iter().map(|(e, _)| e.to_string()).collect();

        let created = match self.create_spreadsheet(&title, &sheet_titles).await {
            Ok(created) => created,
            Err(e) => {
                events.error(LogSource::Sheets, format!("Spreadsheet creation failed: {e}"));
                return Err(e.into());
            }
        };
        events.info(
            LogSource::Sheets,
            format!("Created spreadsheet '{title}' ({})", created.spreadsheet_id),
        );

        for (entity, table) in tables {
            let rows = sheet_rows(table);
            let written = rows.len().saturating_sub(1);

            for (index, chunk) in rows.chunks(self.rows_per_batch).enumerate() {
                let start_row = index * self.rows_per_batch + 1;
                let result = with_retry(&self.policy, || {
                    self.write_chunk(&created.spreadsheet_id, entity.as_str(), start_row, chunk)
                })
                .await;

                if let Err(e) = result {
                    events.error(
                        LogSource::Sheets,
                        format!("Writing {entity} rows from {start_row} failed: {e}"),
                    );
                    return Err(e.into());
                }
            }

            events.info(LogSource::Sheets, format!("Wrote {written} {entity} rows"));
        }

        events.success(
            LogSource::Sheets,
            format!("Spreadsheet ready: {}", created.spreadsheet_url),
        );
        Ok(SpreadsheetLink {
            spreadsheet_id: created.spreadsheet_id,
            url: created.spreadsheet_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, SheetsError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SheetsError::Unavailable(format!("invalid Sheets URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Unavailable("Sheets URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn create_spreadsheet(
        &self,
        title: &str,
        sheet_titles: &[String],
    ) -> std::result::Result<CreatedSpreadsheet, SheetsError> {
        let url = self.endpoint(&["v4", "spreadsheets"])?;
        let sheets: Vec<Value> = sheet_titles
            .iter()
            .map(|t| json!({"properties": {"title": t}}))
            .collect();
        let body = json!({"properties": {"title": title}, "sheets": sheets});

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.access_token.expose_secret().bearer())
            .json(&body)
            .send()
            .await
            .map_err(|e| SheetsError::Unavailable(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json::<CreatedSpreadsheet>()
            .await
            .map_err(|e| SheetsError::Rejected {
                status: 200,
                message: format!("unexpected create response: {e}"),
            })
    }

    async fn write_chunk(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        start_row: usize,
        rows: &[Vec<String>],
    ) -> std::result::Result<(), SheetsError> {
        let range = format!("'{sheet}'!A{start_row}");
        let mut url = self.endpoint(&["v4", "spreadsheets", spreadsheet_id, "values", &range])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");

        tracing::debug!(sheet, start_row, rows = rows.len(), "Writing sheet rows");

        let response = self
            .http
            .put(url)
            .header(AUTHORIZATION, self.access_token.expose_secret().bearer())
            .json(&json!({"range": range, "majorDimension": "ROWS", "values": rows}))
            .send()
            .await
            .map_err(|e| SheetsError::Unavailable(e.to_string()))?;

        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, SheetsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    let code = status.as_u16();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SheetsError::Unauthorized {
            status: code,
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => SheetsError::Unavailable(format!("rate limited: {message}")),
        s if s.is_server_error() => SheetsError::Unavailable(format!("{code}: {message}")),
        _ => SheetsError::Rejected {
            status: code,
            message,
        },
    })
}

/// Header plus data rows, with formula-looking `+` values kept as text
fn sheet_rows(table: &Table) -> Vec<Vec<String>> {
    table
        .clone()
        .into_rows()
        .into_iter()
        .map(|row| row.into_iter().map(protect_cell).collect())
        .collect()
}

fn protect_cell(cell: String) -> String {
    if cell.starts_with('+') {
        format!("'{cell}")
    } else {
        cell
    }
}
