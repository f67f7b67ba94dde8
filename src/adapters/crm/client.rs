//! CRM REST client
//!
//! `GET {base_url}/{api_path}?page=N&limit=L` with a bearer token. Records come
//! back under `_embedded.{api_path}`; a `_links.next` entry means another page
//! exists.

use crate::adapters::crm::{Page, PageFetcher, RateLimiter};
use crate::config::{CrmConfig, SecretString};
use crate::domain::{CrmError, DateFilter, EntityKind, ExporterError, Record};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// HTTP [`PageFetcher`] for the CRM API
///
/// # Example
///
/// ```no_run
/// use crm_exporter::adapters::crm::{CrmClient, PageFetcher};
/// use crm_exporter::config::CrmConfig;
/// use crm_exporter::domain::{DateFilter, EntityKind};
///
/// # async fn example(config: CrmConfig) -> Result<(), Box<dyn std::error::Error>> {
/// let client = CrmClient::new(&config)?;
/// let page = client
///     .fetch_page(EntityKind::Contacts, 1, &DateFilter::default())
///     .await?;
/// println!("{} contacts, more: {}", page.len(), page.has_more);
/// # Ok(())
/// # }
/// ```
pub struct CrmClient {
    http: Client,
    base_url: String,
    access_token: Option<SecretString>,
    page_size: u32,
    with_relations: bool,
    limiter: RateLimiter,
}

impl CrmClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &CrmConfig) -> crate::domain::Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("crm-exporter/", env!("CARGO_PKG_VERSION")));

        if !config.tls_verify {
            tracing::warn!("TLS certificate verification disabled for CRM requests");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|e| {
            ExporterError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            page_size: config.page_size,
            with_relations: config.with_relations,
            limiter: RateLimiter::per_second(config.max_requests_per_second),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn page_url(&self, entity: EntityKind, page: u32, filter: &DateFilter) -> Result<Url, CrmError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, entity.api_path()))
            .map_err(|e| CrmError::ClientError {
                status: 0,
                message: format!("invalid CRM URL: {e}"),
            })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &page.to_string())
                .append_pair("limit", &self.page_size.to_string());

            if self.with_relations {
                if let Some(relations) = entity.relations() {
                    query.append_pair("with", relations);
                }
            }
            if let Some(from) = filter.from_timestamp() {
                query.append_pair("filter[created_at][from]", &from.to_string());
            }
            if let Some(to) = filter.to_timestamp() {
                query.append_pair("filter[created_at][to]", &to.to_string());
            }
        }

        Ok(url)
    }

    fn record_url(&self, entity: EntityKind, id: &str) -> Result<Url, CrmError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, entity.api_path()))
            .map_err(|e| CrmError::ClientError {
                status: 0,
                message: format!("invalid CRM URL: {e}"),
            })?;
        url.path_segments_mut()
            .map_err(|()| CrmError::ClientError {
                status: 0,
                message: format!("CRM base URL cannot take a path: {}", self.base_url),
            })?
            .push(id);

        if self.with_relations {
            if let Some(relations) = entity.relations() {
                url.query_pairs_mut().append_pair("with", relations);
            }
        }
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match self.access_token {
            Some(ref token) => request.header(AUTHORIZATION, token.expose_secret().bearer()),
            None => request,
        }
    }
}

#[async_trait]
impl PageFetcher for CrmClient {
    async fn fetch_page(
        &self,
        entity: EntityKind,
        page: u32,
        filter: &DateFilter,
    ) -> Result<Page, CrmError> {
        let url = self.page_url(entity, page, filter)?;

        self.limiter.acquire().await;
        tracing::debug!(entity = %entity, page, url = %url, "Fetching page");

        let response = self.get(url).send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(Page::empty());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CrmError::InvalidResponse(format!("{entity} page {page}: {e}")))?;

        parse_page(entity, page, body, self.page_size)
    }

    async fn fetch_record(&self, entity: EntityKind, id: &str) -> Result<Option<Record>, CrmError> {
        let url = self.record_url(entity, id)?;

        self.limiter.acquire().await;
        tracing::debug!(entity = %entity, record_id = id, url = %url, "Fetching record");

        let response = self.get(url).send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CrmError::InvalidResponse(format!("{entity} {id}: {e}")))?;

        Record::from_value(body)
            .map(Some)
            .map_err(|e| CrmError::InvalidResponse(format!("{entity} {id}: {e}")))
    }
}

fn classify_transport_error(e: reqwest::Error) -> CrmError {
    if e.is_timeout() {
        CrmError::Timeout(e.to_string())
    } else {
        CrmError::ConnectionFailed(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> CrmError {
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("no body").to_string()
    } else {
        body
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CrmError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => CrmError::RateLimited(message),
        s if s.is_server_error() => CrmError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => CrmError::ClientError {
            status: s.as_u16(),
            message,
        },
    }
}

/// Decode a page body
///
/// A body without `_embedded` is an empty last page. Without `_links` the
/// page is assumed to continue when it is full.
fn parse_page(entity: EntityKind, page: u32, body: Value, page_size: u32) -> Result<Page, CrmError> {
    let Value::Object(mut body) = body else {
        return Err(CrmError::InvalidResponse(format!(
            "{entity} page {page}: body is not an object"
        )));
    };

    let items = match body
        .get_mut("_embedded")
        .and_then(|embedded| embedded.get_mut(entity.api_path()))
        .map(Value::take)
    {
        None | Some(Value::Null) => return Ok(Page::empty()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(CrmError::InvalidResponse(format!(
                "{entity} page {page}: _embedded.{} is {}, expected an array",
                entity.api_path(),
                json_type(&other)
            )))
        }
    };

    let records = items
        .into_iter()
        .map(Record::from_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CrmError::InvalidResponse(format!("{entity} page {page}: {e}")))?;

    // An empty page always ends the export
    let has_more = !records.is_empty()
        && match body.get("_links") {
            Some(links) => links.get("next").is_some_and(|next| !next.is_null()),
            None => records.len() >= page_size as usize,
        };

    Ok(Page::new(records, has_more))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::json;

    fn config(base_url: String) -> CrmConfig {
        CrmConfig {
            base_url,
            access_token: Some(secret_string("test-token".to_string())),
            page_size: 2,
            timeout_seconds: 5,
            max_requests_per_second: 50,
            tls_verify: true,
            with_relations: true,
        }
    }

    #[tokio::test]
    async fn test_fetch_page_sends_paging_and_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/leads")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "3".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
                Matcher::UrlEncoded("with".into(), "contacts".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "_embedded": {"leads": [{"id": 1}, {"id": 2}]},
                    "_links": {"next": {"href": "next"}}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = CrmClient::new(&config(server.url())).unwrap();
        let page = client
            .fetch_page(EntityKind::Deals, 3, &DateFilter::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.records[1].id(), "2");
    }

    #[tokio::test]
    async fn test_fetch_record_by_id() {
        let mut server = mockito::Server::new_async().await;
        let found = server
            .mock("GET", "/companies/42")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::UrlEncoded("with".into(), "contacts,leads".into()))
            .with_status(200)
            .with_body(json!({"id": 42, "name": "Acme"}).to_string())
            .create_async()
            .await;
        let gone = server
            .mock("GET", "/companies/7")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = CrmClient::new(&config(server.url())).unwrap();
        let record = client
            .fetch_record(EntityKind::Companies, "42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id(), "42");
        assert_eq!(record.get("name"), Some(&json!("Acme")));

        assert!(client
            .fetch_record(EntityKind::Companies, "7")
            .await
            .unwrap()
            .is_none());

        found.assert_async().await;
        gone.assert_async().await;
    }

    #[tokio::test]
    async fn test_date_filter_is_sent_as_whole_days() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/contacts")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter[created_at][from]".into(), "1709251200".into()),
                Matcher::UrlEncoded("filter[created_at][to]".into(), "1709337599".into()),
            ]))
            .with_status(204)
            .create_async()
            .await;

        let day = NaiveDate::from_ymd_opt(2024, 3, 1);
        let client = CrmClient::new(&config(server.url())).unwrap();
        let page = client
            .fetch_page(EntityKind::Contacts, 1, &DateFilter::new(day, day))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(page.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/companies")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("token expired")
            .create_async()
            .await;

        let client = CrmClient::new(&config(server.url())).unwrap();
        let err = client
            .fetch_page(EntityKind::Companies, 1, &DateFilter::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CrmError::Unauthorized(ref m) if m == "token expired"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_and_rate_limit_are_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("GET", "/events")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(429)
            .create_async()
            .await;

        let client = CrmClient::new(&config(server.url())).unwrap();
        let filter = DateFilter::default();

        let first = client.fetch_page(EntityKind::Events, 1, &filter).await.unwrap_err();
        assert!(matches!(first, CrmError::ServerError { status: 503, .. }));
        assert!(first.is_transient());

        let second = client.fetch_page(EntityKind::Events, 2, &filter).await.unwrap_err();
        assert!(matches!(second, CrmError::RateLimited(_)));
        assert!(second.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/contacts")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = CrmClient::new(&config(server.url())).unwrap();
        let err = client
            .fetch_page(EntityKind::Contacts, 1, &DateFilter::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CrmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let client = CrmClient::new(&config("http://127.0.0.1:1".to_string())).unwrap();
        let err = client
            .fetch_page(EntityKind::Deals, 1, &DateFilter::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_page_without_links_uses_page_size() {
        let full = json!({"_embedded": {"contacts": [{"id": 1}, {"id": 2}]}});
        assert!(parse_page(EntityKind::Contacts, 1, full, 2).unwrap().has_more);

        let short = json!({"_embedded": {"contacts": [{"id": 1}]}});
        assert!(!parse_page(EntityKind::Contacts, 1, short, 2).unwrap().has_more);
    }

    #[test]
    fn test_parse_page_links_without_next_is_last() {
        let body = json!({
            "_embedded": {"events": [{"id": "a"}, {"id": "b"}]},
            "_links": {"self": {"href": "x"}}
        });
        assert!(!parse_page(EntityKind::Events, 1, body, 2).unwrap().has_more);
    }

    #[test]
    fn test_parse_page_missing_embedded_is_empty() {
        let page = parse_page(EntityKind::Deals, 9, json!({"_page": 9}), 50).unwrap();
        assert_eq!(page, Page::empty());
    }

    #[test]
    fn test_parse_page_rejects_record_without_id() {
        let body = json!({"_embedded": {"leads": [{"id": 1}, {"name": "no id"}]}});
        let err = parse_page(EntityKind::Deals, 1, body, 50).unwrap_err();
        assert!(matches!(err, CrmError::InvalidResponse(_)));
    }
}
