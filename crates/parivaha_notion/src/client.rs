//! Notion API client abstraction.
//!
//! The adapter talks to Notion through [`NotionClient`] so the HTTP
//! implementation can be swapped for [`MemoryNotionClient`] in tests.

use crate::error::{NotionError, NotionResult};
use chrono::{Duration, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Page properties keyed by property name.
pub type Properties = Map<String, Value>;

/// Largest page size the query endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 100;

/// A database page as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Page id.
    pub id: String,
    /// Last edit time, RFC 3339.
    pub last_edited_time: String,
    /// Whether the page is archived.
    #[serde(default)]
    pub archived: bool,
    /// Whether the page is in the trash.
    #[serde(default)]
    pub in_trash: bool,
    /// Public URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Property values.
    #[serde(default)]
    pub properties: Properties,
}

impl Page {
    /// Returns true unless the page is archived or trashed.
    pub fn is_live(&self) -> bool {
        !self.archived && !self.in_trash
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryPage {
    /// Pages in this batch.
    pub results: Vec<Page>,
    /// Cursor for the next batch.
    #[serde(default)]
    pub next_cursor: Option<String>,
    /// Whether more batches follow.
    #[serde(default)]
    pub has_more: bool,
}

/// Type of a database property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// The page title.
    Title,
    /// Rich text.
    RichText,
    /// Single select.
    Select,
    /// Status.
    Status,
    /// URL.
    Url,
    /// Email address.
    Email,
    /// Phone number.
    PhoneNumber,
    /// Multi select.
    MultiSelect,
    /// Relation to other pages.
    Relation,
    /// Date or date range start.
    Date,
    /// Creation time (read-only).
    CreatedTime,
    /// Last edit time (read-only).
    LastEditedTime,
    /// Checkbox.
    Checkbox,
    /// Number.
    Number,
    /// Any other property type; ignored.
    Other(String),
}

impl PropertyKind {
    /// Parses the API type name.
    pub fn parse(name: &str) -> Self {
        match name {
            "title" => Self::Title,
            "rich_text" => Self::RichText,
            "select" => Self::Select,
            "status" => Self::Status,
            "url" => Self::Url,
            "email" => Self::Email,
            "phone_number" => Self::PhoneNumber,
            "multi_select" => Self::MultiSelect,
            "relation" => Self::Relation,
            "date" => Self::Date,
            "created_time" => Self::CreatedTime,
            "last_edited_time" => Self::LastEditedTime,
            "checkbox" => Self::Checkbox,
            "number" => Self::Number,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the API type name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Title => "title",
            Self::RichText => "rich_text",
            Self::Select => "select",
            Self::Status => "status",
            Self::Url => "url",
            Self::Email => "email",
            Self::PhoneNumber => "phone_number",
            Self::MultiSelect => "multi_select",
            Self::Relation => "relation",
            Self::Date => "date",
            Self::CreatedTime => "created_time",
            Self::LastEditedTime => "last_edited_time",
            Self::Checkbox => "checkbox",
            Self::Number => "number",
            Self::Other(name) => name,
        }
    }

    /// Returns true if pages can set this property.
    pub fn is_writable(&self) -> bool {
        !matches!(
            self,
            Self::CreatedTime | Self::LastEditedTime | Self::Other(_)
        )
    }
}

/// Property names and types of a database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseSchema {
    properties: BTreeMap<String, PropertyKind>,
}

impl DatabaseSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property.
    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.insert(name.into(), kind);
        self
    }

    /// Reads the schema from a database object.
    pub fn from_json(database: &Value) -> NotionResult<Self> {
        let properties = database
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| NotionError::Decode("database has no properties".into()))?;

        let mut schema = Self::new();
        for (name, property) in properties {
            let kind = property
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| NotionError::Decode(format!("property {name} has no type")))?;
            schema.properties.insert(name.clone(), PropertyKind::parse(kind));
        }
        Ok(schema)
    }

    /// Type of `name`, if the database has it.
    pub fn kind(&self, name: &str) -> Option<&PropertyKind> {
        self.properties.get(name)
    }

    /// Name of the title property.
    pub fn title_property(&self) -> Option<&str> {
        self.properties
            .iter()
            .find(|(_, kind)| **kind == PropertyKind::Title)
            .map(|(name, _)| name.as_str())
    }

    /// Iterates properties by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyKind)> {
        self.properties.iter().map(|(n, k)| (n.as_str(), k))
    }
}

/// Operations the adapter needs from Notion.
///
/// Page bodies are exchanged as markdown; implementations convert to and
/// from blocks.
pub trait NotionClient: Send + Sync {
    /// Fetches the schema of a database.
    fn retrieve_database(&self, database_id: &str) -> NotionResult<DatabaseSchema>;

    /// Fetches one batch of database pages, starting at `cursor`.
    fn query_database(&self, database_id: &str, cursor: Option<&str>) -> NotionResult<QueryPage>;

    /// Fetches a page.
    fn retrieve_page(&self, page_id: &str) -> NotionResult<Page>;

    /// Creates a page in a database with the given body.
    fn create_page(&self, database_id: &str, properties: Properties, body: &str) -> NotionResult<Page>;

    /// Sets properties of a page, leaving others untouched.
    fn update_page(&self, page_id: &str, properties: Properties) -> NotionResult<Page>;

    /// Archives a page.
    fn archive_page(&self, page_id: &str) -> NotionResult<Page>;

    /// Reads a page body as markdown.
    fn read_body(&self, page_id: &str) -> NotionResult<String>;

    /// Replaces a page body.
    fn replace_body(&self, page_id: &str, body: &str) -> NotionResult<()>;

    /// The body `read_body` returns after `replace_body(body)`.
    fn render_body(&self, body: &str) -> String {
        body.to_string()
    }
}

struct StoredPage {
    page: Page,
    body: String,
}

/// An in-memory Notion database for testing.
///
/// Each change advances a simulated clock by one minute, so every edit
/// gets a distinct `last_edited_time` unless the clock is frozen. Errors
/// can be queued to fail the next calls.
pub struct MemoryNotionClient {
    database_id: String,
    schema: DatabaseSchema,
    pages: RwLock<BTreeMap<String, StoredPage>>,
    clock: AtomicU64,
    clock_frozen: AtomicBool,
    next_id: AtomicU64,
    page_size: usize,
    failures: Mutex<VecDeque<NotionError>>,
    calls: AtomicU64,
}

impl MemoryNotionClient {
    /// Creates an empty database.
    pub fn new(database_id: impl Into<String>, schema: DatabaseSchema) -> Self {
        Self {
            database_id: database_id.into(),
            schema,
            pages: RwLock::new(BTreeMap::new()),
            clock: AtomicU64::new(0),
            clock_frozen: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            page_size: MAX_PAGE_SIZE,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Sets how many pages a query returns per batch.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes the next call fail with `error`. Queued errors fire in order.
    pub fn fail_next(&self, error: NotionError) {
        self.failures.lock().push_back(error);
    }

    /// Stops the clock, so later edits share the last edit time.
    ///
    /// Mirrors the minute precision of `last_edited_time`.
    pub fn freeze_clock(&self, frozen: bool) {
        self.clock_frozen.store(frozen, Ordering::SeqCst);
    }

    /// Number of calls made so far, failed ones included.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of live pages.
    pub fn len(&self) -> usize {
        self.pages.read().values().filter(|p| p.page.is_live()).count()
    }

    /// Returns true if there are no live pages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets a page, archived ones included.
    pub fn page(&self, page_id: &str) -> Option<Page> {
        self.pages.read().get(page_id).map(|p| p.page.clone())
    }

    /// Gets a page body.
    pub fn body(&self, page_id: &str) -> Option<String> {
        self.pages.read().get(page_id).map(|p| p.body.clone())
    }

    fn call(&self) -> NotionResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn tick(&self) -> String {
        let minutes = if self.clock_frozen.load(Ordering::SeqCst) {
            self.clock.load(Ordering::SeqCst)
        } else {
            self.clock.fetch_add(1, Ordering::SeqCst) + 1
        } as i64;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
        (start + Duration::minutes(minutes))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
    }

    fn check_database(&self, database_id: &str) -> NotionResult<()> {
        if database_id == self.database_id {
            Ok(())
        } else {
            Err(NotionError::NotFound(database_id.to_string()))
        }
    }

    fn edit<T>(&self, page_id: &str, f: impl FnOnce(&mut StoredPage) -> T) -> NotionResult<T> {
        let mut pages = self.pages.write();
        let stored = pages
            .get_mut(page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))?;
        let out = f(stored);
        stored.page.last_edited_time = self.tick();
        Ok(out)
    }

    fn check_properties(&self, properties: &Properties) -> NotionResult<()> {
        for name in properties.keys() {
            match self.schema.kind(name) {
                Some(kind) if kind.is_writable() => {}
                Some(kind) => {
                    return Err(NotionError::Api {
                        status: 400,
                        code: "validation_error".into(),
                        message: format!("{name} is a {} property", kind.as_str()),
                    })
                }
                None => {
                    return Err(NotionError::Api {
                        status: 400,
                        code: "validation_error".into(),
                        message: format!("{name} is not a property that exists"),
                    })
                }
            }
        }
        Ok(())
    }
}

impl NotionClient for MemoryNotionClient {
    fn retrieve_database(&self, database_id: &str) -> NotionResult<DatabaseSchema> {
        self.call()?;
        self.check_database(database_id)?;
        Ok(self.schema.clone())
    }

    fn query_database(&self, database_id: &str, cursor: Option<&str>) -> NotionResult<QueryPage> {
        self.call()?;
        self.check_database(database_id)?;
        let pages = self.pages.read();
        let mut live = pages
            .iter()
            .filter(|(_, p)| p.page.is_live())
            .filter(|(id, _)| cursor.map_or(true, |c| id.as_str() >= c));

        let results: Vec<Page> = live
            .by_ref()
            .take(self.page_size)
            .map(|(_, p)| p.page.clone())
            .collect();
        let next_cursor = live.next().map(|(id, _)| id.clone());
        Ok(QueryPage {
            results,
            has_more: next_cursor.is_some(),
            next_cursor,
        })
    }

    fn retrieve_page(&self, page_id: &str) -> NotionResult<Page> {
        self.call()?;
        self.page(page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))
    }

    fn create_page(&self, database_id: &str, properties: Properties, body: &str) -> NotionResult<Page> {
        self.call()?;
        self.check_database(database_id)?;
        self.check_properties(&properties)?;

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("00000000-0000-4000-8000-{n:012x}");
        let page = Page {
            url: Some(format!("https://www.notion.so/{}", id.replace('-', ""))),
            id: id.clone(),
            last_edited_time: self.tick(),
            archived: false,
            in_trash: false,
            properties,
        };
        self.pages.write().insert(
            id,
            StoredPage {
                page: page.clone(),
                body: body.to_string(),
            },
        );
        Ok(page)
    }

    fn update_page(&self, page_id: &str, properties: Properties) -> NotionResult<Page> {
        self.call()?;
        self.check_properties(&properties)?;
        self.edit(page_id, |stored| stored.page.properties.extend(properties))?;
        self.page(page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))
    }

    fn archive_page(&self, page_id: &str) -> NotionResult<Page> {
        self.call()?;
        self.edit(page_id, |stored| stored.page.archived = true)?;
        self.page(page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))
    }

    fn read_body(&self, page_id: &str) -> NotionResult<String> {
        self.call()?;
        self.body(page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.to_string()))
    }

    fn replace_body(&self, page_id: &str, body: &str) -> NotionResult<()> {
        self.call()?;
        self.edit(page_id, |stored| stored.body = body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new()
            .with_property("Name", PropertyKind::Title)
            .with_property("Edited", PropertyKind::LastEditedTime)
    }

    fn name(value: &str) -> Properties {
        let mut props = Properties::new();
        props.insert(
            "Name".into(),
            json!({ "title": [{ "type": "text", "text": { "content": value } }] }),
        );
        props
    }

    #[test]
    fn schema_from_database_json() {
        let database = json!({
            "object": "database",
            "properties": {
                "Name": { "id": "title", "type": "title", "title": {} },
                "Tags": { "id": "a1", "type": "multi_select", "multi_select": {} },
                "Formula": { "id": "b2", "type": "formula", "formula": {} },
            }
        });
        let schema = DatabaseSchema::from_json(&database).unwrap();
        assert_eq!(schema.kind("Tags"), Some(&PropertyKind::MultiSelect));
        assert_eq!(schema.kind("Formula"), Some(&PropertyKind::Other("formula".into())));
        assert_eq!(schema.title_property(), Some("Name"));
        assert!(DatabaseSchema::from_json(&json!({})).is_err());
    }

    #[test]
    fn property_kind_names_round_trip() {
        for name in ["title", "rich_text", "status", "relation", "last_edited_time", "rollup"] {
            assert_eq!(PropertyKind::parse(name).as_str(), name);
        }
        assert!(PropertyKind::Title.is_writable());
        assert!(!PropertyKind::CreatedTime.is_writable());
        assert!(!PropertyKind::parse("formula").is_writable());
    }

    #[test]
    fn query_paginates_live_pages() {
        let client = MemoryNotionClient::new("db", schema()).with_page_size(2);
        let ids: Vec<String> = (0..5)
            .map(|i| client.create_page("db", name(&format!("p{i}")), "").unwrap().id)
            .collect();
        client.archive_page(&ids[1]).unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let batch = client.query_database("db", cursor.as_deref()).unwrap();
            seen.extend(batch.results.into_iter().map(|p| p.id));
            if !batch.has_more {
                break;
            }
            cursor = batch.next_cursor;
        }
        assert_eq!(seen, vec![ids[0].clone(), ids[2].clone(), ids[3].clone(), ids[4].clone()]);
    }

    #[test]
    fn edits_advance_last_edited_time() {
        let client = MemoryNotionClient::new("db", schema());
        let page = client.create_page("db", name("a"), "body").unwrap();
        client.replace_body(&page.id, "new body").unwrap();
        let updated = client.update_page(&page.id, name("b")).unwrap();
        assert!(updated.last_edited_time > page.last_edited_time);
        assert_eq!(client.body(&page.id).unwrap(), "new body");
    }

    #[test]
    fn read_only_and_unknown_properties_are_rejected() {
        let client = MemoryNotionClient::new("db", schema());
        let mut props = Properties::new();
        props.insert("Edited".into(), json!({ "last_edited_time": "2024-01-01" }));
        assert!(matches!(
            client.create_page("db", props, ""),
            Err(NotionError::Api { status: 400, .. })
        ));

        let mut props = Properties::new();
        props.insert("Missing".into(), json!({ "rich_text": [] }));
        assert!(client.create_page("db", props, "").is_err());
        assert!(matches!(
            client.query_database("other", None),
            Err(NotionError::NotFound(_))
        ));
    }

    #[test]
    fn queued_failures_fire_once() {
        let client = MemoryNotionClient::new("db", schema());
        client.fail_next(NotionError::Transport("reset".into()));
        assert!(client.retrieve_database("db").is_err());
        assert!(client.retrieve_database("db").is_ok());
        assert_eq!(client.call_count(), 2);
    }
}
