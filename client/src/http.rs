use crate::entry::LogEntry;
use crate::error::ClientError;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Extension};
use reqwest_tracing::TracingMiddleware;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

pub const DEFAULT_API_URL: &str = "https://logging.googleapis.com";
const ENTRIES_LIST_PATH: &str = "/v2/entries:list";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_url: String,
    pub project_id: String,
    pub access_token: Option<String>,
    pub page_size: u32,
    /// Upper bound on `nextPageToken` follow-ups per listing.
    pub max_pages: u32,
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            project_id: project_id.into(),
            access_token: None,
            page_size: 1000,
            max_pages: 10,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesRequest<'a> {
    resource_names: Vec<String>,
    filter: &'a str,
    order_by: &'static str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEntriesResponse {
    #[serde(default)]
    entries: Vec<LogEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Client for the Cloud Logging `entries:list` endpoint.
///
/// Requests are traced with `reqwest-tracing` and carry the current
/// OpenTelemetry context. The underlying connection pool is reused across calls.
#[derive(Clone)]
pub struct LoggingClient {
    http_client: ClientWithMiddleware,
    settings: ClientSettings,
}

impl LoggingClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let reqwest_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        let http_client = ClientBuilder::new(reqwest_client)
            .with_init(Extension(reqwest_tracing::OtelName("logging-api".into())))
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            http_client,
            settings,
        })
    }

    /// Lists every entry matching `filter`, oldest first, following pagination
    /// up to `max_pages`.
    #[instrument(skip(self), fields(project = %self.settings.project_id, num_entries))]
    pub async fn list_entries(&self, filter: &str) -> Result<Vec<LogEntry>, ClientError> {
        let mut entries = Vec::new();
        let mut page_token = None;

        for page in 1..=self.settings.max_pages.max(1) {
            let response = self.list_page(filter, page_token.take()).await?;
            entries.extend(response.entries);

            match response.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) if page < self.settings.max_pages => page_token = Some(token),
                Some(_) => {
                    tracing::warn!(
                        max_pages = self.settings.max_pages,
                        "Stopping entries:list pagination at page limit"
                    );
                    break;
                }
                None => break,
            }
        }

        tracing::Span::current().record("num_entries", entries.len());
        Ok(entries)
    }

    async fn list_page(
        &self,
        filter: &str,
        page_token: Option<String>,
    ) -> Result<ListEntriesResponse, ClientError> {
        let body = ListEntriesRequest {
            resource_names: vec![format!("projects/{}", self.settings.project_id)],
            filter,
            order_by: "timestamp asc",
            page_size: self.settings.page_size,
            page_token,
        };

        let mut builder = self
            .http_client
            .post(format!("{}{}", self.settings.api_url, ENTRIES_LIST_PATH))
            .json(&body);
        if let Some(token) = &self.settings.access_token {
            builder = builder.bearer_auth(token);
        }

        let mut request = builder.build()?;
        crate::inject_opentelemetry_context_into_request(&mut request);

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        let text = response.text().await.map_err(reqwest_middleware::Error::from)?;

        if !status.is_success() {
            return Err(ClientError::Status { status, body: text });
        }
        if text.trim().is_empty() {
            // The API answers `{}` or nothing at all when there are no matches.
            return Ok(ListEntriesResponse::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl std::fmt::Debug for LoggingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingClient")
            .field("api_url", &self.settings.api_url)
            .field("project_id", &self.settings.project_id)
            .finish_non_exhaustive()
    }
}
