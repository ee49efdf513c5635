//! Blocking HTTP client for the Notion REST API.

use crate::blocks::{blocks_to_markdown, markdown_to_blocks, MAX_BLOCKS_PER_REQUEST};
use crate::client::{DatabaseSchema, NotionClient, Page, Properties, QueryPage, MAX_PAGE_SIZE};
use crate::error::{NotionError, NotionResult};
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};

/// API version sent with every request.
pub const NOTION_VERSION: &str = "2022-06-28";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Notion client over HTTPS.
pub struct HttpNotionClient {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpNotionClient {
    /// Creates a client authenticating with an integration `token`.
    pub fn new(token: impl Into<String>) -> NotionResult<Self> {
        Self::with_timeout(token, DEFAULT_TIMEOUT)
    }

    /// Creates a client with a per-request timeout.
    pub fn with_timeout(token: impl Into<String>, timeout: Duration) -> NotionResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parivaha/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotionError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
        })
    }

    /// Points the client at another base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> NotionResult<Value> {
        trace!(%method, path, "Notion request");
        let mut request = self
            .http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .map_err(|e| NotionError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| NotionError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status, &text, path));
        }
        serde_json::from_str(&text).map_err(|e| NotionError::Decode(e.to_string()))
    }

    fn send_as<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&Value>) -> NotionResult<T> {
        let value = self.send(method, path, body)?;
        serde_json::from_value(value).map_err(|e| NotionError::Decode(e.to_string()))
    }

    /// All child blocks of a page, following pagination.
    fn children(&self, block_id: &str) -> NotionResult<Vec<Value>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut path = format!("/blocks/{block_id}/children?page_size={MAX_PAGE_SIZE}");
            if let Some(cursor) = &cursor {
                path.push_str("&start_cursor=");
                path.push_str(cursor);
            }
            let batch = self.send(Method::GET, &path, None)?;
            if let Some(results) = batch.get("results").and_then(Value::as_array) {
                blocks.extend(results.iter().cloned());
            }
            cursor = next_cursor(&batch);
            if cursor.is_none() {
                return Ok(blocks);
            }
        }
    }

    fn append(&self, block_id: &str, blocks: &[Value]) -> NotionResult<()> {
        for chunk in blocks.chunks(MAX_BLOCKS_PER_REQUEST) {
            self.send(
                Method::PATCH,
                &format!("/blocks/{block_id}/children"),
                Some(&json!({ "children": chunk })),
            )?;
        }
        Ok(())
    }
}

fn next_cursor(batch: &Value) -> Option<String> {
    let has_more = batch.get("has_more").and_then(Value::as_bool).unwrap_or(false);
    has_more
        .then(|| batch.get("next_cursor").and_then(Value::as_str))
        .flatten()
        .map(str::to_string)
}

/// Builds the error for a failed response.
fn api_error(status: StatusCode, body: &str, path: &str) -> NotionError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    if status == StatusCode::NOT_FOUND {
        return NotionError::NotFound(path.to_string());
    }
    NotionError::Api {
        status: status.as_u16(),
        code: field("code").unwrap_or_else(|| "unknown".into()),
        message: field("message").unwrap_or_else(|| body.chars().take(200).collect()),
    }
}

impl NotionClient for HttpNotionClient {
    fn retrieve_database(&self, database_id: &str) -> NotionResult<DatabaseSchema> {
        let database = self.send(Method::GET, &format!("/databases/{database_id}"), None)?;
        DatabaseSchema::from_json(&database)
    }

    fn query_database(&self, database_id: &str, cursor: Option<&str>) -> NotionResult<QueryPage> {
        let mut body = json!({ "page_size": MAX_PAGE_SIZE });
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }
        let batch: QueryPage =
            self.send_as(Method::POST, &format!("/databases/{database_id}/query"), Some(&body))?;
        debug!(pages = batch.results.len(), has_more = batch.has_more, "Queried database");
        Ok(batch)
    }

    fn retrieve_page(&self, page_id: &str) -> NotionResult<Page> {
        self.send_as(Method::GET, &format!("/pages/{page_id}"), None)
    }

    fn create_page(&self, database_id: &str, properties: Properties, body: &str) -> NotionResult<Page> {
        let blocks = markdown_to_blocks(body);
        let split = blocks.len().min(MAX_BLOCKS_PER_REQUEST);
        let (first, rest) = blocks.split_at(split);
        let request = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
            "children": first,
        });
        let page: Page = self.send_as(Method::POST, "/pages", Some(&request))?;
        if rest.is_empty() {
            return Ok(page);
        }
        self.append(&page.id, rest)?;
        self.retrieve_page(&page.id)
    }

    fn update_page(&self, page_id: &str, properties: Properties) -> NotionResult<Page> {
        self.send_as(
            Method::PATCH,
            &format!("/pages/{page_id}"),
            Some(&json!({ "properties": properties })),
        )
    }

    fn archive_page(&self, page_id: &str) -> NotionResult<Page> {
        self.send_as(
            Method::PATCH,
            &format!("/pages/{page_id}"),
            Some(&json!({ "archived": true })),
        )
    }

    fn read_body(&self, page_id: &str) -> NotionResult<String> {
        Ok(blocks_to_markdown(&self.children(page_id)?))
    }

    fn replace_body(&self, page_id: &str, body: &str) -> NotionResult<()> {
        for block in self.children(page_id)? {
            if let Some(id) = block.get("id").and_then(Value::as_str) {
                self.send(Method::DELETE, &format!("/blocks/{id}"), None)?;
            }
        }
        self.append(page_id, &markdown_to_blocks(body))
    }

    fn render_body(&self, body: &str) -> String {
        blocks_to_markdown(&markdown_to_blocks(body))
    }
}
