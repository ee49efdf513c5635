//! Record adapter over a Notion database.

use crate::client::{DatabaseSchema, NotionClient, Page};
use crate::error::{NotionError, NotionResult};
use crate::properties::{decode_properties, encode_properties};
use parivaha_model::{Record, RecordId, Revision, Side};
use parivaha_sync_engine::{parse_timestamp, AdapterError, AdapterResult, RecordAdapter, RecordStream, WriteReceipt};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tracing::debug;

const PROPERTY_HASH_CHARS: usize = 12;

/// A Notion database seen as a record store.
///
/// Each live page is one record keyed by page id. Fields come from the
/// page properties and the body from its blocks.
pub struct NotionAdapter<C: NotionClient> {
    client: C,
    database_id: String,
    schema: DatabaseSchema,
    page_bodies: bool,
}

impl<C: NotionClient> NotionAdapter<C> {
    /// Connects to `database_id`, fetching its schema.
    pub fn connect(client: C, database_id: impl Into<String>) -> NotionResult<Self> {
        let database_id = database_id.into();
        let schema = client.retrieve_database(&database_id)?;
        debug!(database = %database_id, "Loaded database schema");
        Ok(Self {
            client,
            database_id,
            schema,
            page_bodies: true,
        })
    }

    /// Sets whether page bodies are read and written.
    ///
    /// Reading a body costs a request per page.
    pub fn with_page_bodies(mut self, enabled: bool) -> Self {
        self.page_bodies = enabled;
        self
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the database id.
    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Returns the database schema.
    pub fn schema(&self) -> &DatabaseSchema {
        &self.schema
    }

    fn to_record(&self, page: &Page) -> NotionResult<Record> {
        let body = if self.page_bodies {
            self.client.read_body(&page.id)?
        } else {
            String::new()
        };
        let revision = page_revision(page, self.page_bodies.then_some(body.as_str()));
        let mut record = Record::new(page.id.as_str(), Side::Notion, revision).with_body(body);
        record.fields = decode_properties(&page.properties, &self.schema);
        record.modified_at = parse_timestamp(&page.last_edited_time);
        record.archived = !page.is_live();
        Ok(record)
    }

    fn update(&self, record: &Record) -> NotionResult<Revision> {
        if record.archived {
            let page = self.client.archive_page(record.id.as_str())?;
            debug!(id = %record.id, "Archived page");
            return Ok(page_revision(&page, None));
        }

        let properties = encode_properties(&record.fields, &self.schema)?;
        let body = if self.page_bodies {
            let current = self.client.read_body(record.id.as_str())?;
            if current == record.body {
                Some(current)
            } else {
                self.client.replace_body(record.id.as_str(), &record.body)?;
                Some(self.client.render_body(&record.body))
            }
        } else {
            None
        };
        // Properties last, so the returned page carries the final edit time.
        let page = self.client.update_page(record.id.as_str(), properties)?;
        debug!(id = %record.id, "Updated page");
        Ok(page_revision(&page, body.as_deref()))
    }
}

/// Revision of a page: its edit time plus a short hash of its properties
/// and, when bodies are synced, its body.
///
/// The edit time alone has minute precision, so the hash separates
/// edits made within the same minute.
pub fn page_revision(page: &Page, body: Option<&str>) -> Revision {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&page.properties).unwrap_or_default());
    if let Some(body) = body {
        hasher.update([0u8]);
        hasher.update(body.as_bytes());
    }
    let hash = format!("{:x}", hasher.finalize());
    Revision::Tag(format!(
        "{}:{}",
        page.last_edited_time,
        &hash[..PROPERTY_HASH_CHARS]
    ))
}

fn not_found_as(id: &RecordId) -> impl FnOnce(NotionError) -> AdapterError + '_ {
    move |err| match err {
        NotionError::NotFound(_) => AdapterError::NotFound(id.clone()),
        other => other.into(),
    }
}

/// Lazily pages through a database query.
struct PageStream<'a, C: NotionClient> {
    adapter: &'a NotionAdapter<C>,
    cursor: Option<String>,
    buffer: VecDeque<Page>,
    exhausted: bool,
}

impl<C: NotionClient> Iterator for PageStream<'_, C> {
    type Item = AdapterResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(page) = self.buffer.pop_front() {
                if !page.is_live() {
                    continue;
                }
                return Some(self.adapter.to_record(&page).map_err(AdapterError::from));
            }
            if self.exhausted {
                return None;
            }

            let adapter = self.adapter;
            match adapter
                .client
                .query_database(&adapter.database_id, self.cursor.as_deref())
            {
                Ok(batch) => {
                    self.exhausted = !batch.has_more || batch.next_cursor.is_none();
                    self.cursor = batch.next_cursor;
                    self.buffer.extend(batch.results);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

impl<C: NotionClient> RecordAdapter for NotionAdapter<C> {
    fn side(&self) -> Side {
        Side::Notion
    }

    fn list_records(&self, since: Option<&Revision>) -> AdapterResult<RecordStream<'_>> {
        if since.is_some() {
            debug!("Listing the whole database; edit times are not a cursor");
        }
        Ok(Box::new(PageStream {
            adapter: self,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn write_record(&self, record: &Record) -> AdapterResult<Revision> {
        self.update(record).map_err(not_found_as(&record.id))
    }

    fn create_record(&self, record: &Record) -> AdapterResult<WriteReceipt> {
        let properties = encode_properties(&record.fields, &self.schema)?;
        let body = if self.page_bodies { record.body.as_str() } else { "" };
        let page = self
            .client
            .create_page(&self.database_id, properties, body)?;
        debug!(id = %page.id, "Created page");
        let rendered = self.page_bodies.then(|| self.client.render_body(body));
        Ok(WriteReceipt {
            id: RecordId::new(page.id.as_str()),
            revision: page_revision(&page, rendered.as_deref()),
        })
    }
}
