use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::{Error, Result};
use crate::engine::document::{DocId, Document};

const RECORD_FILE: &str = "records.bin";

/// Persisted shard contents: the documents plus the metadata map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ShardRecord {
    next_docid: DocId,
    metadata: BTreeMap<String, String>,
    docs: BTreeMap<DocId, Document>,
}

/// Derived in-memory index over one shard, rebuilt on load.
#[derive(Debug, Clone, Default)]
struct ShardIndex {
    postings: BTreeMap<String, RoaringBitmap>,
    slots: BTreeMap<u32, RoaringBitmap>,
}

impl ShardIndex {
    fn build(docs: &BTreeMap<DocId, Document>) -> Self {
        let mut index = ShardIndex::default();
        for (docid, doc) in docs {
            index.insert(*docid, doc);
        }
        index
    }

    fn insert(&mut self, docid: DocId, doc: &Document) {
        for (term, _) in doc.terms() {
            self.postings.entry(term.clone()).or_default().insert(docid);
        }
        for (slot, _) in doc.values() {
            self.slots.entry(*slot).or_default().insert(docid);
        }
    }

    fn remove(&mut self, docid: DocId, doc: &Document) {
        for (term, _) in doc.terms() {
            if let Some(bitmap) = self.postings.get_mut(term) {
                bitmap.remove(docid);
                if bitmap.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        for (slot, _) in doc.values() {
            if let Some(bitmap) = self.slots.get_mut(slot) {
                bitmap.remove(docid);
                if bitmap.is_empty() {
                    self.slots.remove(slot);
                }
            }
        }
    }
}

/// One shard's loaded state; shared between read handles.
#[derive(Debug, Clone, Default)]
pub struct ShardState {
    record: ShardRecord,
    index: ShardIndex,
}

impl ShardState {
    fn load(path: &Path) -> Result<Self> {
        let file = path.join(RECORD_FILE);
        let bytes = fs::read(&file).map_err(|e| {
            Error::engine(format!("couldn't open database at '{}': {}", path.display(), e))
        })?;
        let record: ShardRecord = bincode::deserialize(&bytes)?;
        let index = ShardIndex::build(&record.docs);
        Ok(ShardState { record, index })
    }

    pub fn doc_count(&self) -> u64 {
        self.record.docs.len() as u64
    }

    pub fn term_exists(&self, term: &str) -> bool {
        self.index.postings.contains_key(term)
    }

    pub fn term_freq(&self, term: &str) -> u64 {
        self.index.postings.get(term).map(|b| b.len()).unwrap_or(0)
    }

    pub fn postlist(&self, term: &str) -> Vec<DocId> {
        self.index
            .postings
            .get(term)
            .map(|b| b.iter().collect())
            .unwrap_or_default()
    }

    pub fn slot_docs(&self, slot: u32) -> Vec<DocId> {
        self.index
            .slots
            .get(&slot)
            .map(|b| b.iter().collect())
            .unwrap_or_default()
    }

    pub fn get_document(&self, docid: DocId) -> Option<&Document> {
        self.record.docs.get(&docid)
    }

    pub fn docs(&self) -> impl Iterator<Item = (DocId, &Document)> {
        self.record.docs.iter().map(|(id, doc)| (*id, doc))
    }

    /// Terms carrying the given prefix, with their shard term frequency.
    fn terms_with_prefix(&self, prefix: &str, out: &mut BTreeMap<String, u64>) {
        for (term, bitmap) in self.index.postings.range(prefix.to_string()..) {
            if !term.starts_with(prefix) {
                break;
            }
            *out.entry(term.clone()).or_insert(0) += bitmap.len();
        }
    }
}

/// Read-only handle: the logical union of one or more shards.
#[derive(Debug, Clone, Default)]
pub struct Database {
    shards: Vec<Arc<ShardState>>,
}

impl Database {
    pub fn empty() -> Self {
        Database::default()
    }

    /// Open a single on-disk shard read-only.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Database {
            shards: vec![Arc::new(ShardState::load(path)?)],
        })
    }

    /// Extend this handle with the shards of another, forming a union.
    pub fn add_database(&mut self, other: Database) {
        self.shards.extend(other.shards);
    }

    pub(crate) fn from_shard(shard: Arc<ShardState>) -> Self {
        Database { shards: vec![shard] }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub(crate) fn shards(&self) -> &[Arc<ShardState>] {
        &self.shards
    }

    pub fn doc_count(&self) -> u64 {
        self.shards.iter().map(|s| s.doc_count()).sum()
    }

    pub fn term_exists(&self, term: &str) -> bool {
        self.shards.iter().any(|s| s.term_exists(term))
    }

    pub fn term_freq(&self, term: &str) -> u64 {
        self.shards.iter().map(|s| s.term_freq(term)).sum()
    }

    /// First document bearing the term, scanning shards in handle order.
    pub fn get_document_by_term(&self, idterm: &str) -> Option<Document> {
        for shard in &self.shards {
            if let Some(docid) = shard.postlist(idterm).first() {
                return shard.get_document(*docid).cloned();
            }
        }
        None
    }

    pub fn get_metadata(&self, key: &str) -> String {
        for shard in &self.shards {
            if let Some(value) = shard.record.metadata.get(key) {
                return value.clone();
            }
        }
        String::new()
    }

    /// All terms carrying the prefix, merged across shards, with their
    /// union term frequencies, in lexicographic order.
    pub fn terms_with_prefix(&self, prefix: &str) -> BTreeMap<String, u64> {
        let mut out = BTreeMap::new();
        for shard in &self.shards {
            shard.terms_with_prefix(prefix, &mut out);
        }
        out
    }

    /// Every document in the union, in shard order then docid order.
    pub fn docs(&self) -> impl Iterator<Item = (usize, DocId, &Document)> {
        self.shards
            .iter()
            .enumerate()
            .flat_map(|(idx, shard)| shard.docs().map(move |(docid, doc)| (idx, docid, doc)))
    }

    pub fn fetch(&self, shard: usize, docid: DocId) -> Option<&Document> {
        self.shards.get(shard).and_then(|s| s.get_document(docid))
    }
}

/// Exclusive writable handle on one on-disk shard.
#[derive(Debug)]
pub struct WritableDatabase {
    path: PathBuf,
    record: ShardRecord,
    index: ShardIndex,
}

impl WritableDatabase {
    /// Open with create-or-open semantics: a missing shard is created and
    /// persisted immediately so read-only handles can see it.
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)
            .map_err(|e| Error::sys(format!("couldn't create directory '{}'", path.display()), e.raw_os_error()))?;
        let file = path.join(RECORD_FILE);
        let mut db = if file.exists() {
            let state = ShardState::load(path)?;
            WritableDatabase {
                path: path.to_path_buf(),
                record: state.record,
                index: state.index,
            }
        } else {
            WritableDatabase {
                path: path.to_path_buf(),
                record: ShardRecord::default(),
                index: ShardIndex::default(),
            }
        };
        if !file.exists() {
            db.commit()?;
        }
        Ok(db)
    }

    pub fn add_document(&mut self, doc: Document) -> DocId {
        let docid = self.record.next_docid;
        self.record.next_docid += 1;
        self.index.insert(docid, &doc);
        self.record.docs.insert(docid, doc);
        docid
    }

    /// Replace-by-term: afterwards at most one document bears `idterm`.
    pub fn replace_document(&mut self, idterm: &str, doc: Document) -> DocId {
        let existing = self.postlist(idterm);
        match existing.split_first() {
            None => self.add_document(doc),
            Some((first, rest)) => {
                for docid in rest {
                    self.remove_docid(*docid);
                }
                self.remove_docid(*first);
                self.index.insert(*first, &doc);
                self.record.docs.insert(*first, doc);
                *first
            }
        }
    }

    /// Remove any documents bearing `idterm`; no error if absent.
    pub fn delete_document(&mut self, idterm: &str) {
        for docid in self.postlist(idterm) {
            self.remove_docid(docid);
        }
    }

    fn remove_docid(&mut self, docid: DocId) {
        if let Some(doc) = self.record.docs.remove(&docid) {
            self.index.remove(docid, &doc);
        }
    }

    /// Set a metadata entry; an empty value removes the key.
    pub fn set_metadata(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.record.metadata.remove(key);
        } else {
            self.record.metadata.insert(key.to_string(), value.to_string());
        }
    }

    pub fn get_metadata(&self, key: &str) -> String {
        self.record.metadata.get(key).cloned().unwrap_or_default()
    }

    /// Flush pending changes durably, via write-temp-then-rename.
    pub fn commit(&mut self) -> Result<()> {
        let bytes = bincode::serialize(&self.record)?;
        let file = self.path.join(RECORD_FILE);
        let tmp = self.path.join(format!("{}.tmp", RECORD_FILE));
        fs::write(&tmp, &bytes)
            .map_err(|e| Error::sys(format!("couldn't write '{}'", tmp.display()), e.raw_os_error()))?;
        fs::rename(&tmp, &file)
            .map_err(|e| Error::sys(format!("couldn't rename to '{}'", file.display()), e.raw_os_error()))?;
        Ok(())
    }

    pub fn doc_count(&self) -> u64 {
        self.record.docs.len() as u64
    }

    pub fn term_exists(&self, term: &str) -> bool {
        self.index.postings.contains_key(term)
    }

    pub fn postlist(&self, term: &str) -> Vec<DocId> {
        self.index
            .postings
            .get(term)
            .map(|b| b.iter().collect())
            .unwrap_or_default()
    }

    pub fn get_document_by_term(&self, idterm: &str) -> Option<Document> {
        let docid = *self.postlist(idterm).first()?;
        self.record.docs.get(&docid).cloned()
    }

    /// A read view over the current (possibly uncommitted) state.
    pub fn snapshot(&self) -> Arc<ShardState> {
        Arc::new(ShardState {
            record: self.record.clone(),
            index: self.index.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc_with_term(term: &str) -> Document {
        let mut doc = Document::new();
        doc.add_term(term, 1);
        doc
    }

    #[test]
    fn test_create_or_open_then_readonly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard");
        let _w = WritableDatabase::open(&path).unwrap();
        // Creating the writable handle persists an empty shard.
        let r = Database::open(&path).unwrap();
        assert_eq!(r.doc_count(), 0);
    }

    #[test]
    fn test_readonly_missing_is_engine_error() {
        let dir = TempDir::new().unwrap();
        let err = Database::open(&dir.path().join("nothing")).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Engine);
    }

    #[test]
    fn test_commit_then_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard");
        let mut w = WritableDatabase::open(&path).unwrap();
        w.add_document(doc_with_term("t\thello"));
        w.set_metadata("_k", "v");

        // Uncommitted changes are invisible to a fresh read handle.
        let r = Database::open(&path).unwrap();
        assert_eq!(r.doc_count(), 0);

        w.commit().unwrap();
        let r = Database::open(&path).unwrap();
        assert_eq!(r.doc_count(), 1);
        assert!(r.term_exists("t\thello"));
        assert_eq!(r.get_metadata("_k"), "v");
        assert_eq!(r.get_metadata("_missing"), "");
    }

    #[test]
    fn test_replace_by_term() {
        let dir = TempDir::new().unwrap();
        let mut w = WritableDatabase::open(&dir.path().join("shard")).unwrap();
        let mut doc1 = doc_with_term("\ttype\t1");
        doc1.set_data_field("v", "[1]".to_string());
        let mut doc2 = doc_with_term("\ttype\t1");
        doc2.set_data_field("v", "[2]".to_string());
        w.replace_document("\ttype\t1", doc1);
        w.replace_document("\ttype\t1", doc2);
        assert_eq!(w.doc_count(), 1);
        let doc = w.get_document_by_term("\ttype\t1").unwrap();
        assert_eq!(doc.data_field("v"), Some("[2]"));
    }

    #[test]
    fn test_delete_document() {
        let dir = TempDir::new().unwrap();
        let mut w = WritableDatabase::open(&dir.path().join("shard")).unwrap();
        w.replace_document("\ttype\t1", doc_with_term("\ttype\t1"));
        w.delete_document("\ttype\t1");
        assert_eq!(w.doc_count(), 0);
        // Deleting an absent idterm is a no-op.
        w.delete_document("\ttype\t1");
    }

    #[test]
    fn test_union_counts_and_termfreqs() {
        let dir = TempDir::new().unwrap();
        let p1 = dir.path().join("a");
        let p2 = dir.path().join("b");
        let mut w1 = WritableDatabase::open(&p1).unwrap();
        let mut w2 = WritableDatabase::open(&p2).unwrap();
        w1.add_document(doc_with_term("t\tx"));
        w1.add_document(doc_with_term("t\tx"));
        w2.add_document(doc_with_term("t\tx"));
        w2.add_document(doc_with_term("t\ty"));
        w1.commit().unwrap();
        w2.commit().unwrap();

        let mut union = Database::open(&p1).unwrap();
        union.add_database(Database::open(&p2).unwrap());
        assert_eq!(union.doc_count(), 4);
        assert_eq!(union.term_freq("t\tx"), 3);
        let terms = union.terms_with_prefix("t\t");
        let collected: Vec<(&str, u64)> =
            terms.iter().map(|(t, f)| (t.as_str(), *f)).collect();
        assert_eq!(collected, vec![("t\tx", 3), ("t\ty", 1)]);
    }
}
