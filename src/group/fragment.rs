use std::path::PathBuf;

use crate::core::error::{Error, Result};
use crate::engine::database::{Database, WritableDatabase};
use crate::engine::document::Document;

/// The open state of a fragment. At most one handle exists at a time;
/// write and read handles never coexist.
enum FragState {
    Closed,
    Read(Database),
    Write(WritableDatabase),
}

/// A handle on one on-disk index shard inside a group.
pub struct Fragment {
    name: String,
    path: PathBuf,
    state: FragState,
}

impl Fragment {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Fragment {
            name: name.into(),
            path: path.into(),
            state: FragState::Closed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, FragState::Closed)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.state, FragState::Write(_))
    }

    /// Release any open handle. Idempotent.
    pub fn close(&mut self) {
        self.state = FragState::Closed;
    }

    /// Acquire the exclusive write handle, with create-or-open semantics.
    /// A no-op when already open for writing.
    pub fn open_write(&mut self) -> Result<()> {
        if let FragState::Write(_) = self.state {
            return Ok(());
        }
        self.state = FragState::Closed;
        self.state = FragState::Write(WritableDatabase::open(&self.path)?);
        Ok(())
    }

    /// Open for reading; if already reading, reopen in place to pick up
    /// the latest committed data.
    pub fn open_read(&mut self) -> Result<()> {
        self.state = FragState::Closed;
        self.state = FragState::Read(Database::open(&self.path)?);
        Ok(())
    }

    fn writable(&mut self) -> Result<&mut WritableDatabase> {
        match &mut self.state {
            FragState::Write(db) => Ok(db),
            _ => Err(Error::invalid_state(
                "fragment must be open for writing",
            )),
        }
    }

    /// Add a document. An empty idterm appends; otherwise replace-by-term.
    pub fn add_doc(&mut self, doc: Document, idterm: &str) -> Result<()> {
        let db = self.writable()?;
        if idterm.is_empty() {
            db.add_document(doc);
        } else {
            db.replace_document(idterm, doc);
        }
        Ok(())
    }

    pub fn delete_doc(&mut self, idterm: &str) -> Result<()> {
        self.writable()?.delete_document(idterm);
        Ok(())
    }

    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.writable()?.set_metadata(key, value);
        Ok(())
    }

    /// Flush pending changes durably. A no-op unless open for writing.
    pub fn commit(&mut self) -> Result<()> {
        if let FragState::Write(db) = &mut self.state {
            db.commit()?;
        }
        Ok(())
    }

    /// A single-shard read view over the current state, opening the
    /// fragment read-only first if it is closed.
    pub fn read_view(&mut self) -> Result<Database> {
        match &self.state {
            FragState::Write(db) => Ok(Database::from_shard(db.snapshot())),
            FragState::Read(db) => Ok(db.clone()),
            FragState::Closed => {
                self.open_read()?;
                self.read_view()
            }
        }
    }

    pub fn doc_count(&mut self) -> Result<u64> {
        match &self.state {
            FragState::Write(db) => Ok(db.doc_count()),
            FragState::Read(db) => Ok(db.doc_count()),
            FragState::Closed => {
                self.open_read()?;
                self.doc_count()
            }
        }
    }

    pub fn term_exists(&mut self, term: &str) -> Result<bool> {
        match &self.state {
            FragState::Write(db) => Ok(db.term_exists(term)),
            FragState::Read(db) => Ok(db.term_exists(term)),
            FragState::Closed => {
                self.open_read()?;
                self.term_exists(term)
            }
        }
    }

    pub fn get_document_by_term(&mut self, idterm: &str) -> Result<Option<Document>> {
        match &self.state {
            FragState::Write(db) => Ok(db.get_document_by_term(idterm)),
            FragState::Read(db) => Ok(db.get_document_by_term(idterm)),
            FragState::Closed => {
                self.open_read()?;
                self.get_document_by_term(idterm)
            }
        }
    }

    pub fn get_metadata(&mut self, key: &str) -> Result<String> {
        match &self.state {
            FragState::Write(db) => Ok(db.get_metadata(key)),
            FragState::Read(db) => Ok(db.get_metadata(key)),
            FragState::Closed => {
                self.open_read()?;
                self.get_metadata(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_write_requires_open() {
        let dir = TempDir::new().unwrap();
        let mut frag = Fragment::new("frag0", dir.path().join("frag0"));
        let err = frag.add_doc(Document::new(), "").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        let err = frag.delete_doc("\tt\t1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn test_open_write_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut frag = Fragment::new("frag0", dir.path().join("frag0"));
        frag.open_write().unwrap();
        let mut doc = Document::new();
        doc.add_term("\tt\t1", 0);
        frag.add_doc(doc, "\tt\t1").unwrap();
        // Second open_write is a no-op: the pending document survives.
        frag.open_write().unwrap();
        assert_eq!(frag.doc_count().unwrap(), 1);
        assert!(frag.is_writable());
    }

    #[test]
    fn test_read_reopen_sees_committed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frag0");
        {
            let mut writer = Fragment::new("frag0", &path);
            writer.open_write().unwrap();
            writer.commit().unwrap();
        }
        let mut reader = Fragment::new("frag0", &path);
        reader.open_read().unwrap();
        assert_eq!(reader.doc_count().unwrap(), 0);

        let mut writer = Fragment::new("frag0", &path);
        writer.open_write().unwrap();
        let mut doc = Document::new();
        doc.add_term("\tt\t1", 0);
        writer.add_doc(doc, "\tt\t1").unwrap();
        writer.commit().unwrap();

        // The old read handle does not see the commit until reopened.
        assert_eq!(reader.doc_count().unwrap(), 0);
        reader.open_read().unwrap();
        assert_eq!(reader.doc_count().unwrap(), 1);
        assert!(reader.term_exists("\tt\t1").unwrap());
    }

    #[test]
    fn test_close_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut frag = Fragment::new("frag0", dir.path().join("frag0"));
        frag.open_write().unwrap();
        frag.close();
        frag.close();
        assert!(!frag.is_open());
    }
}
