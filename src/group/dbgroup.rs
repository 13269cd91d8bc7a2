use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::core::error::{Error, Result};
use crate::engine::database::Database;
use crate::engine::document::Document;
use crate::group::fragment::Fragment;

const FRAGLIST_KEY: &str = "_frags";
const NEXT_FRAGNUM_KEY: &str = "_next_fragnum";
const SIDECAR_FILE: &str = "XAPIANDB";

pub const DEFAULT_MAX_NEWDB_DOCS: u64 = 10_000_000;

/// A group of index fragments managed as a single unit.
///
/// A distinguished control fragment persists the fragment list and a
/// monotonic fragment counter; fragment names are never reused. The
/// `XAPIANDB` sidecar lists the fragments so the group directory can be
/// opened as one logical union.
pub struct DbGroup {
    max_newdb_docs: u64,
    groupdir: PathBuf,
    control: Fragment,
    frags: Vec<Fragment>,
    next_fragnum: u64,
    group_db: Option<Database>,
    last_fraglist: String,
}

impl DbGroup {
    pub fn new(groupdir: impl Into<PathBuf>) -> Self {
        let groupdir = groupdir.into();
        let control = Fragment::new("control", groupdir.join("control"));
        DbGroup {
            max_newdb_docs: DEFAULT_MAX_NEWDB_DOCS,
            groupdir,
            control,
            frags: Vec::new(),
            next_fragnum: 0,
            group_db: None,
            last_fraglist: String::new(),
        }
    }

    pub fn set_max_newdb_docs(&mut self, max: u64) {
        self.max_newdb_docs = max;
    }

    pub fn is_open(&self) -> bool {
        self.control.is_open()
    }

    pub fn is_writable(&self) -> bool {
        self.control.is_writable()
    }

    fn invalidate_group_db(&mut self) {
        self.group_db = None;
    }

    /// Re-read the fragment list from control metadata.
    fn init_frags(&mut self) -> Result<()> {
        let fraglist_str = self.control.get_metadata(FRAGLIST_KEY)?;
        if fraglist_str == self.last_fraglist && !fraglist_str.is_empty() {
            return Ok(());
        }
        if fraglist_str.is_empty() {
            self.frags.clear();
            self.last_fraglist.clear();
            self.next_fragnum = 0;
            return Ok(());
        }
        let fraglist: Value = serde_json::from_str(&fraglist_str)?;
        let entries = fraglist
            .as_array()
            .ok_or_else(|| Error::invalid_value("stored list of fragments must be an array"))?;
        self.frags.clear();
        for entry in entries {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_value("stored fragment information lacks a name"))?;
            self.frags
                .push(Fragment::new(name, self.groupdir.join(name)));
        }
        self.last_fraglist = fraglist_str;

        let next_str = self.control.get_metadata(NEXT_FRAGNUM_KEY)?;
        self.next_fragnum = if next_str.is_empty() {
            0
        } else {
            serde_json::from_str::<u64>(&next_str)?
        };
        Ok(())
    }

    /// Persist the fragment list to control metadata and rewrite the
    /// sidecar atomically.
    fn store_fraglist(&mut self) -> Result<()> {
        let mut fraglist = Vec::new();
        let mut sidecar = String::new();
        for frag in &self.frags {
            fraglist.push(json!({ "name": frag.name() }));
            sidecar.push_str("auto ");
            sidecar.push_str(frag.name());
            sidecar.push('\n');
        }
        let fraglist_str = serde_json::to_string(&Value::Array(fraglist))?;
        self.control.set_metadata(FRAGLIST_KEY, &fraglist_str)?;
        self.control
            .set_metadata(NEXT_FRAGNUM_KEY, &self.next_fragnum.to_string())?;
        self.last_fraglist = fraglist_str;

        write_atomic(&self.groupdir.join(SIDECAR_FILE), sidecar.as_bytes())
    }

    /// Allocate and open a new tail fragment, persisting the list.
    fn add_frag(&mut self) -> Result<()> {
        self.invalidate_group_db();
        let fragname = format!("frag{}", self.next_fragnum);
        self.next_fragnum += 1;
        let mut frag = Fragment::new(&fragname, self.groupdir.join(&fragname));
        frag.open_write()?;
        self.frags.push(frag);

        self.store_fraglist()?;
        self.control.commit()
    }

    pub fn open_writable(&mut self) -> Result<()> {
        if self.control.is_writable() {
            // We hold the write lock, so nothing can have changed under
            // us; no need to reopen.
            return Ok(());
        }

        if !self.groupdir.is_dir() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o770)
                .create(&self.groupdir)
                .map_err(|e| {
                    Error::sys(
                        format!("couldn't create directory '{}'", self.groupdir.display()),
                        e.raw_os_error(),
                    )
                })?;
        }

        self.invalidate_group_db();
        self.control.open_write()?;
        if let Err(e) = self.init_frags() {
            self.control.close();
            return Err(e);
        }
        Ok(())
    }

    pub fn open_readonly(&mut self) -> Result<()> {
        self.invalidate_group_db();
        self.control.open_read()?;
        let result = self.init_frags().and_then(|_| {
            // Force a reopen of every fragment.
            for frag in &mut self.frags {
                frag.open_read()?;
            }
            Ok(())
        });
        if let Err(e) = result {
            self.control.close();
            return Err(e);
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.invalidate_group_db();
        self.last_fraglist.clear();
        self.control.close();
        for frag in &mut self.frags {
            frag.close();
        }
    }

    /// The unioned read view over all fragments.
    pub fn get_db(&mut self) -> Result<&Database> {
        if !self.control.is_open() {
            return Err(Error::invalid_state(
                "database group must be open to access the group view",
            ));
        }
        if self.group_db.is_none() {
            let mut union = Database::empty();
            for frag in &mut self.frags {
                union.add_database(frag.read_view()?);
            }
            self.group_db = Some(union);
        }
        Ok(self.group_db.as_ref().unwrap())
    }

    /// Find a document by idterm, scanning fragments newest-first.
    pub fn get_document(&mut self, idterm: &str) -> Result<Option<Document>> {
        if !self.control.is_open() {
            return Err(Error::invalid_state(
                "database group must be open to get a document",
            ));
        }
        for frag in self.frags.iter_mut().rev() {
            if let Some(doc) = frag.get_document_by_term(idterm)? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    pub fn doc_exists(&mut self, idterm: &str) -> Result<bool> {
        if !self.control.is_open() {
            return Err(Error::invalid_state(
                "database group must be open to check a document",
            ));
        }
        for frag in self.frags.iter_mut().rev() {
            if frag.term_exists(idterm)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn doc_count(&mut self) -> Result<u64> {
        if !self.control.is_open() {
            return Err(Error::invalid_state(
                "database group must be open to count documents",
            ));
        }
        let mut total = 0;
        for frag in &mut self.frags {
            total += frag.doc_count()?;
        }
        Ok(total)
    }

    /// Add a document, routing to the fragment already containing its
    /// idterm, else appending to the tail fragment (rotating to a new one
    /// when the tail reaches the document cap).
    pub fn add_doc(&mut self, doc: Document, idterm: &str) -> Result<()> {
        if !self.control.is_writable() {
            return Err(Error::invalid_state(
                "database group must be open for writing to add a document",
            ));
        }

        if self.frags.is_empty() {
            self.add_frag()?;
        }

        if !idterm.is_empty() {
            for i in (0..self.frags.len()).rev() {
                if self.frags[i].term_exists(idterm)? {
                    self.frags[i].open_write()?;
                    self.frags[i].add_doc(doc, idterm)?;
                    self.invalidate_group_db();
                    return Ok(());
                }
            }
        }

        let tail_docs = self
            .frags
            .last_mut()
            .map(|f| f.doc_count())
            .transpose()?
            .unwrap_or(0);
        if tail_docs >= self.max_newdb_docs {
            self.add_frag()?;
        }
        let tail = self.frags.last_mut().unwrap();
        tail.open_write()?;
        tail.add_doc(doc, idterm)?;
        self.invalidate_group_db();
        Ok(())
    }

    /// Delete the document bearing the idterm from the newest fragment
    /// containing it; a no-op when absent.
    pub fn delete_doc(&mut self, idterm: &str) -> Result<()> {
        if !self.control.is_writable() {
            return Err(Error::invalid_state(
                "database group must be open for writing to delete a document",
            ));
        }
        if idterm.is_empty() {
            return Err(Error::invalid_value(
                "empty idterm must not be passed to delete a document",
            ));
        }
        for i in (0..self.frags.len()).rev() {
            if self.frags[i].term_exists(idterm)? {
                self.frags[i].open_write()?;
                self.frags[i].delete_doc(idterm)?;
                self.invalidate_group_db();
                return Ok(());
            }
        }
        Ok(())
    }

    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.control.set_metadata(key, value)
    }

    pub fn get_metadata(&mut self, key: &str) -> Result<String> {
        if !self.control.is_open() {
            return Err(Error::invalid_state(
                "database group must be open to read metadata",
            ));
        }
        self.control.get_metadata(key)
    }

    /// Commit all fragments, then the control fragment.
    pub fn sync(&mut self) -> Result<()> {
        for frag in &mut self.frags {
            frag.commit()?;
        }
        self.control.commit()
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    fs::write(&tmp, contents)
        .map_err(|e| Error::sys(format!("couldn't write '{}'", tmp.display()), e.raw_os_error()))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::sys(format!("couldn't rename to '{}'", path.display()), e.raw_os_error()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use tempfile::TempDir;

    fn doc_for(idterm: &str) -> Document {
        let mut doc = Document::new();
        if !idterm.is_empty() {
            doc.add_term(idterm, 0);
        }
        doc.add_term("t\tpayload", 1);
        doc
    }

    #[test]
    fn test_requires_writable() {
        let dir = TempDir::new().unwrap();
        let mut group = DbGroup::new(dir.path().join("g"));
        let err = group.add_doc(Document::new(), "").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn test_delete_requires_idterm() {
        let dir = TempDir::new().unwrap();
        let mut group = DbGroup::new(dir.path().join("g"));
        group.open_writable().unwrap();
        let err = group.delete_doc("").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidValue);
    }

    #[test]
    fn test_fragment_rotation() {
        let dir = TempDir::new().unwrap();
        let mut group = DbGroup::new(dir.path().join("g"));
        group.set_max_newdb_docs(2);
        group.open_writable().unwrap();
        for _ in 0..5 {
            group.add_doc(doc_for(""), "").unwrap();
        }
        group.sync().unwrap();
        group.close();

        let mut reader = DbGroup::new(dir.path().join("g"));
        reader.open_readonly().unwrap();
        assert_eq!(reader.doc_count().unwrap(), 5);
        assert_eq!(reader.next_fragnum, 3);
        let names: Vec<&str> = reader.frags.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["frag0", "frag1", "frag2"]);

        let sidecar = fs::read_to_string(dir.path().join("g").join(SIDECAR_FILE)).unwrap();
        assert_eq!(sidecar, "auto frag0\nauto frag1\nauto frag2\n");
    }

    #[test]
    fn test_replace_routes_to_owning_fragment() {
        let dir = TempDir::new().unwrap();
        let mut group = DbGroup::new(dir.path().join("g"));
        group.set_max_newdb_docs(1);
        group.open_writable().unwrap();

        group.add_doc(doc_for("\td\t1"), "\td\t1").unwrap();
        group.add_doc(doc_for("\td\t2"), "\td\t2").unwrap();
        assert_eq!(group.frags.len(), 2);

        // Replacing id 1 routes back to frag0 even though it is past the
        // cap; no new fragment appears and the count stays stable.
        group.add_doc(doc_for("\td\t1"), "\td\t1").unwrap();
        assert_eq!(group.frags.len(), 2);
        assert_eq!(group.doc_count().unwrap(), 2);
    }

    #[test]
    fn test_delete_doc() {
        let dir = TempDir::new().unwrap();
        let mut group = DbGroup::new(dir.path().join("g"));
        group.open_writable().unwrap();
        group.add_doc(doc_for("\td\t1"), "\td\t1").unwrap();
        group.delete_doc("\td\t1").unwrap();
        assert_eq!(group.doc_count().unwrap(), 0);
        // Deleting an unknown idterm is a no-op.
        group.delete_doc("\td\tmissing").unwrap();
    }

    #[test]
    fn test_reader_sees_state_after_sync() {
        let dir = TempDir::new().unwrap();
        let mut group = DbGroup::new(dir.path().join("g"));
        group.open_writable().unwrap();
        group.add_doc(doc_for("\td\t1"), "\td\t1").unwrap();

        let mut reader = DbGroup::new(dir.path().join("g"));
        // The fragment exists (add_frag committed control) but the
        // document itself is not yet committed.
        reader.open_readonly().unwrap();
        assert_eq!(reader.doc_count().unwrap(), 0);
        reader.close();

        group.sync().unwrap();
        let mut reader = DbGroup::new(dir.path().join("g"));
        reader.open_readonly().unwrap();
        assert_eq!(reader.doc_count().unwrap(), 1);
        assert!(reader
            .get_document("\td\t1")
            .unwrap()
            .is_some());
        assert!(reader.get_document("\td\tother").unwrap().is_none());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut group = DbGroup::new(dir.path().join("g"));
        group.open_writable().unwrap();
        group.set_metadata("_conf", "{\"a\":1}").unwrap();
        group.sync().unwrap();
        group.close();

        let mut reader = DbGroup::new(dir.path().join("g"));
        reader.open_readonly().unwrap();
        assert_eq!(reader.get_metadata("_conf").unwrap(), "{\"a\":1}");
    }
}
