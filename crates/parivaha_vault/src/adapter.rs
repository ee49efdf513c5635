//! Record adapter over a directory of markdown notes.

use crate::error::{VaultError, VaultResult};
use crate::frontmatter::Document;
use chrono::{DateTime, Utc};
use parivaha_model::{FieldValue, Record, RecordId, Revision, Side};
use parivaha_sync_engine::{AdapterError, AdapterResult, RecordAdapter, RecordStream, WriteReceipt};
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Directory inside the vault holding sync state.
pub const STATE_DIR: &str = ".parivaha";

/// Front matter key holding the linked Notion page id.
pub const NOTION_ID_KEY: &str = "notion_id";
/// Front matter key holding the linked Notion page URL.
pub const NOTION_URL_KEY: &str = "notion_url";

const NOTION_PAGE_URL: &str = "https://www.notion.so/";
const NOTE_EXTENSION: &str = "md";
const MAX_STEM_CHARS: usize = 100;
const MAX_SUFFIX: u32 = 999;

/// An Obsidian vault seen as a record store.
///
/// Each `*.md` file outside hidden directories is one record. Its id is
/// the path relative to the vault root with `/` separators, its fields
/// come from the YAML front matter and its revision is the SHA-256 of the
/// file bytes.
#[derive(Debug, Clone)]
pub struct VaultAdapter {
    root: PathBuf,
    title_key: String,
    hard_delete: bool,
    notion_link: bool,
    parent_key: Option<String>,
}

impl VaultAdapter {
    /// Opens the vault at `root`, which must be an existing directory.
    pub fn open(root: impl AsRef<Path>) -> VaultResult<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(VaultError::NotFound(root.display().to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            title_key: "title".into(),
            hard_delete: false,
            notion_link: false,
            parent_key: None,
        })
    }

    /// Sets the front matter key new file names are derived from.
    pub fn with_title_key(mut self, key: impl Into<String>) -> Self {
        self.title_key = key.into();
        self
    }

    /// Enables removing files on deletion instead of marking them archived.
    pub fn with_hard_delete(mut self, enabled: bool) -> Self {
        self.hard_delete = enabled;
        self
    }

    /// Writes `notion_id` and `notion_url` into notes created from Notion pages.
    pub fn with_notion_link(mut self, enabled: bool) -> Self {
        self.notion_link = enabled;
        self
    }

    /// Lays new notes out as `<title>/<title>.md` folders nested under
    /// their parent page's folder.
    ///
    /// `key` is the front matter key holding the parent page id. The parent
    /// is found through its `notion_id` link, so this needs
    /// [`with_notion_link`](Self::with_notion_link) for parents created by
    /// the sync. A note whose parent is not in the vault yet is placed at
    /// the root.
    pub fn with_hierarchy(mut self, key: impl Into<String>) -> Self {
        self.parent_key = Some(key.into());
        self
    }

    /// Returns the vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory for sync state, `<root>/.parivaha`.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Reads one note, including archived ones.
    pub fn read_note(&self, id: &RecordId) -> VaultResult<Record> {
        let path = self.note_path(id.as_str())?;
        self.load(&path, id.clone()).map(|(record, _)| record)
    }

    /// Resolves a record id to a path inside the vault.
    fn note_path(&self, id: &str) -> VaultResult<PathBuf> {
        let relative = Path::new(id);
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let is_note = relative.extension().is_some_and(|ext| ext == NOTE_EXTENSION);
        if id.is_empty() || !inside || !is_note {
            return Err(VaultError::InvalidPath(id.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn record_id(&self, path: &Path) -> VaultResult<RecordId> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| VaultError::InvalidPath(path.display().to_string()))?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        match parts {
            Some(parts) => Ok(RecordId::new(parts.join("/"))),
            None => Err(VaultError::InvalidPath(path.display().to_string())),
        }
    }

    /// Loads a note and the document it was built from.
    fn load(&self, path: &Path, id: RecordId) -> VaultResult<(Record, Document)> {
        let bytes = fs::read(path)?;
        let modified = fs::metadata(path)?.modified()?;
        let text = String::from_utf8(bytes)
            .map_err(|_| VaultError::FrontMatter(format!("{id} is not valid UTF-8")))?;
        let doc = Document::parse(&text)?;

        let mut record = Record::new(id, Side::Vault, content_revision(text.as_bytes()))
            .with_body(doc.body.clone())
            .with_modified_at(DateTime::<Utc>::from(modified));
        record.fields = doc.fields();
        record.archived = doc.is_archived();
        Ok((record, doc))
    }

    /// Reads a walked entry. Archived notes are skipped.
    ///
    /// A note that cannot be decoded is reported as unreadable by id, so
    /// the sync does not mistake it for a deleted note.
    fn read_entry(&self, path: &Path) -> AdapterResult<Option<Record>> {
        let id = self.record_id(path)?;
        match self.load(path, id.clone()) {
            Ok((record, _)) if record.archived => Ok(None),
            Ok((record, _)) => Ok(Some(record)),
            Err(VaultError::FrontMatter(reason)) => {
                warn!(path = %path.display(), %reason, "Unreadable front matter");
                Err(AdapterError::unreadable(id, reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walks all notes, skipping hidden entries.
    fn walk(&self) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
        WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry))
    }

    /// Finds the note linked to Notion page `page_id`.
    fn find_linked(&self, page_id: &str) -> Option<PathBuf> {
        self.walk()
            .filter_map(Result::ok)
            .filter(is_note)
            .find(|entry| {
                fs::read_to_string(entry.path())
                    .ok()
                    .and_then(|text| Document::parse(&text).ok())
                    .is_some_and(|doc| {
                        doc.front.get(NOTION_ID_KEY).and_then(Value::as_str) == Some(page_id)
                    })
            })
            .map(|entry| entry.into_path())
    }

    /// Directory new notes for `record` go under.
    fn parent_dir(&self, record: &Record) -> PathBuf {
        let parent_id = self
            .parent_key
            .as_ref()
            .and_then(|key| record.field(key))
            .and_then(first_reference);
        let parent_note = parent_id.and_then(|id| {
            let found = self.find_linked(id);
            if found.is_none() {
                debug!(parent = id, "Parent note not in vault; placing note at the root");
            }
            found
        });
        parent_note
            .and_then(|note| note.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.root.clone())
    }

    /// Renders `record` over `doc` and writes it to `path`.
    fn store(&self, path: &Path, mut doc: Document, record: &Record) -> VaultResult<Revision> {
        doc.apply_fields(&record.fields);
        doc.body = record.body.clone();
        doc.set_archived(record.archived);
        let text = doc.render()?;
        write_atomic(path, text.as_bytes())?;
        Ok(content_revision(text.as_bytes()))
    }

    /// Claims a free path for a new note, creating it empty.
    ///
    /// Candidates are the sanitised title, then `title N` and finally a
    /// UUID. Each is claimed with `create_new`, so concurrent creations
    /// never share a file.
    fn reserve_note_path(&self, record: &Record) -> VaultResult<PathBuf> {
        let dir = self.parent_dir(record);
        let nested = self.parent_key.is_some();
        let stem = record
            .field(&self.title_key)
            .and_then(FieldValue::as_text)
            .map(sanitize_stem)
            .filter(|s| !s.is_empty());

        let titled = stem.iter().flat_map(|stem| {
            std::iter::once(stem.clone()).chain((1..=MAX_SUFFIX).map(move |n| format!("{stem} {n}")))
        });
        for name in titled.chain(std::iter::once(uuid::Uuid::new_v4().to_string())) {
            let path = if nested {
                dir.join(&name).join(format!("{name}.{NOTE_EXTENSION}"))
            } else {
                dir.join(format!("{name}.{NOTE_EXTENSION}"))
            };
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(VaultError::InvalidPath(format!("no free note name in {}", dir.display())))
    }

    /// `record` plus the link fields back to the page it mirrors.
    fn linked(&self, record: &Record) -> Record {
        let mut note = record.clone();
        let page_id = record.id.as_str();
        if self.notion_link && !page_id.is_empty() {
            let url = format!("{NOTION_PAGE_URL}{}", page_id.replace('-', ""));
            note.fields.insert(NOTION_ID_KEY.into(), FieldValue::text(page_id));
            note.fields.insert(NOTION_URL_KEY.into(), FieldValue::text(url));
        }
        note
    }
}

impl RecordAdapter for VaultAdapter {
    fn side(&self) -> Side {
        Side::Vault
    }

    fn list_records(&self, since: Option<&Revision>) -> AdapterResult<RecordStream<'_>> {
        if since.is_some() {
            debug!("Content revisions are unordered; listing the whole vault");
        }
        if !self.root.is_dir() {
            return Err(VaultError::NotFound(self.root.display().to_string()).into());
        }

        Ok(Box::new(self.walk().filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(AdapterError::from(VaultError::from(e)))),
            };
            if !is_note(&entry) {
                return None;
            }
            self.read_entry(entry.path()).transpose()
        })))
    }

    fn write_record(&self, record: &Record) -> AdapterResult<Revision> {
        let path = self.note_path(record.id.as_str())?;
        if !path.is_file() {
            return Err(AdapterError::NotFound(record.id.clone()));
        }
        let (_, doc) = self.load(&path, record.id.clone())?;
        let revision = self.store(&path, doc, record)?;
        debug!(id = %record.id, archived = record.archived, "Wrote note");
        Ok(revision)
    }

    /// Creates a note for `record`, whose id is the Notion page it mirrors.
    fn create_record(&self, record: &Record) -> AdapterResult<WriteReceipt> {
        let path = self.reserve_note_path(record)?;
        let stored = self
            .record_id(&path)
            .and_then(|id| Ok((id, self.store(&path, Document::default(), &self.linked(record))?)));
        match stored {
            Ok((id, revision)) => {
                debug!(%id, "Created note");
                Ok(WriteReceipt { id, revision })
            }
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(e.into())
            }
        }
    }

    fn supports_delete(&self) -> bool {
        self.hard_delete
    }

    fn delete_record(&self, id: &RecordId) -> AdapterResult<()> {
        if !self.hard_delete {
            return Err(AdapterError::Unsupported("delete_record"));
        }
        let path = self.note_path(id.as_str())?;
        if !path.is_file() {
            return Err(AdapterError::NotFound(id.clone()));
        }
        fs::remove_file(&path).map_err(VaultError::from)?;
        debug!(%id, "Deleted note");
        Ok(())
    }
}

fn content_revision(bytes: &[u8]) -> Revision {
    Revision::Tag(format!("{:x}", Sha256::digest(bytes)))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// First page id of a parent relation value.
fn first_reference(value: &FieldValue) -> Option<&str> {
    match value {
        FieldValue::Text(id) => Some(id.as_str()),
        FieldValue::Reference(ids) | FieldValue::List(ids) => ids.first().map(String::as_str),
        _ => None,
    }
    .filter(|id| !id.is_empty())
}

fn is_note(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .path()
            .extension()
            .is_some_and(|ext| ext == NOTE_EXTENSION)
}

/// Turns a title into a file stem that is valid on every platform.
fn sanitize_stem(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '^' | '[' | ']' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .take(MAX_STEM_CHARS)
        .collect();
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string()
}

/// Writes `bytes` to a hidden sibling temp file, then renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> VaultResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| VaultError::InvalidPath(path.display().to_string()))?;
    fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VaultError::InvalidPath(path.display().to_string()))?;
    let temp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let mut file = File::create(&temp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}
