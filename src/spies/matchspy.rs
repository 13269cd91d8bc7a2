use std::collections::{BTreeMap, HashSet};

use serde_json::{json, Map, Value};

use crate::engine::database::Database;
use crate::engine::document::Document;
use crate::engine::matcher::MatchObserver;

/// State shared by the term-aggregation spies: consumption limits, the
/// term prefix (suffixed with the field-separator tab when non-empty),
/// stopwords, and the accumulated counts.
#[derive(Debug)]
struct SpyBase {
    docs_seen: u64,
    doc_limit: u64,
    terms_seen: u64,
    result_limit: usize,
    prefix: String,
    orig_prefix: String,
    stopwords: HashSet<String>,
    get_termfreqs: bool,
    counts: BTreeMap<String, u64>,
}

impl SpyBase {
    fn new(prefix: &str, doc_limit: u64, result_limit: usize, get_termfreqs: bool) -> Self {
        let orig_prefix = prefix.to_string();
        let mut prefix = prefix.to_string();
        if !prefix.is_empty() {
            prefix.push('\t');
        }
        SpyBase {
            docs_seen: 0,
            doc_limit,
            terms_seen: 0,
            result_limit,
            prefix,
            orig_prefix,
            stopwords: HashSet::new(),
            get_termfreqs,
            counts: BTreeMap::new(),
        }
    }

    fn add_stopword(&mut self, word: &str) {
        self.stopwords.insert(word.to_string());
    }

    /// The document's term suffixes under the prefix, skipping stopwords,
    /// in term order.
    fn suffixes(&self, doc: &Document) -> Vec<String> {
        let mut suffixes = Vec::new();
        for (term, _) in doc.terms_from(&self.prefix) {
            if !term.starts_with(&self.prefix) {
                break;
            }
            let suffix = &term[self.prefix.len()..];
            if !self.stopwords.contains(suffix) {
                suffixes.push(suffix.to_string());
            }
        }
        suffixes
    }

    /// Counts ranked by descending frequency, ties in ascending term
    /// order, capped at the result limit.
    fn ranked(&self) -> Vec<(&String, u64)> {
        let mut sorted: Vec<(&String, u64)> =
            self.counts.iter().map(|(term, freq)| (term, *freq)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        sorted.truncate(self.result_limit);
        sorted
    }

    /// Look up collection-wide term frequencies for the given suffixes,
    /// in alphabetical order to minimise seeking.
    fn termfreqs(&self, db: &Database, suffixes: impl Iterator<Item = String>) -> BTreeMap<String, u64> {
        let wanted: BTreeMap<String, u64> = suffixes.map(|s| (s, 0)).collect();
        wanted
            .into_iter()
            .map(|(suffix, _)| {
                let freq = db.term_freq(&format!("{}{}", self.prefix, suffix));
                (suffix, freq)
            })
            .collect()
    }

    fn result_header(&self, spy_type: &str) -> Map<String, Value> {
        let mut result = Map::new();
        result.insert("type".to_string(), json!(spy_type));
        result.insert("prefix".to_string(), json!(self.orig_prefix));
        result.insert("docs_seen".to_string(), json!(self.docs_seen));
        result.insert("terms_seen".to_string(), json!(self.terms_seen));
        result
    }
}

/// Counts occurrences of term suffixes under a prefix across matching
/// documents.
#[derive(Debug)]
pub struct TermOccurSpy {
    base: SpyBase,
}

impl TermOccurSpy {
    pub fn new(prefix: &str, doc_limit: u64, result_limit: usize, get_termfreqs: bool) -> Self {
        TermOccurSpy {
            base: SpyBase::new(prefix, doc_limit, result_limit, get_termfreqs),
        }
    }

    pub fn add_stopword(&mut self, word: &str) {
        self.base.add_stopword(word);
    }

    pub fn result(&self, db: &Database) -> Value {
        let ranked = self.base.ranked();
        let termfreqs = if self.base.get_termfreqs {
            Some(
                self.base
                    .termfreqs(db, ranked.iter().map(|(term, _)| (*term).clone())),
            )
        } else {
            None
        };

        let mut counts = Vec::new();
        for (term, freq) in ranked {
            let mut entry = vec![json!(term), json!(freq)];
            if let Some(termfreqs) = &termfreqs {
                entry.push(json!(termfreqs.get(term).copied().unwrap_or(0)));
            }
            counts.push(Value::Array(entry));
        }

        let mut result = self.base.result_header("occur");
        result.insert("counts".to_string(), Value::Array(counts));
        Value::Object(result)
    }
}

impl MatchObserver for TermOccurSpy {
    fn on_document(&mut self, doc: &Document, _score: f64) {
        if self.base.docs_seen >= self.base.doc_limit {
            return;
        }
        self.base.docs_seen += 1;
        for suffix in self.base.suffixes(doc) {
            *self.base.counts.entry(suffix).or_insert(0) += 1;
            self.base.terms_seen += 1;
        }
    }
}

/// Counts co-occurring pairs of term suffixes under a prefix across
/// matching documents. Pair keys join the two suffixes with a NUL byte.
#[derive(Debug)]
pub struct TermCoOccurSpy {
    base: SpyBase,
}

impl TermCoOccurSpy {
    pub fn new(prefix: &str, doc_limit: u64, result_limit: usize, get_termfreqs: bool) -> Self {
        TermCoOccurSpy {
            base: SpyBase::new(prefix, doc_limit, result_limit, get_termfreqs),
        }
    }

    pub fn add_stopword(&mut self, word: &str) {
        self.base.add_stopword(word);
    }

    pub fn result(&self, db: &Database) -> Value {
        let ranked = self.base.ranked();
        let termfreqs = if self.base.get_termfreqs {
            Some(self.base.termfreqs(
                db,
                ranked
                    .iter()
                    .flat_map(|(pair, _)| pair.split('\0').map(str::to_string)),
            ))
        } else {
            None
        };

        let mut counts = Vec::new();
        for (pair, freq) in ranked {
            let (first, second) = match pair.split_once('\0') {
                Some(split) => split,
                None => continue,
            };
            let mut entry = vec![json!(first), json!(second), json!(freq)];
            if let Some(termfreqs) = &termfreqs {
                entry.push(json!(termfreqs.get(first).copied().unwrap_or(0)));
                entry.push(json!(termfreqs.get(second).copied().unwrap_or(0)));
            }
            counts.push(Value::Array(entry));
        }

        let mut result = self.base.result_header("cooccur");
        result.insert("counts".to_string(), Value::Array(counts));
        Value::Object(result)
    }
}

impl MatchObserver for TermCoOccurSpy {
    fn on_document(&mut self, doc: &Document, _score: f64) {
        if self.base.docs_seen >= self.base.doc_limit {
            return;
        }
        self.base.docs_seen += 1;
        let items = self.base.suffixes(doc);
        self.base.terms_seen += items.len() as u64;
        for (i, first) in items.iter().enumerate() {
            for second in &items[i + 1..] {
                let key = format!("{}\0{}", first, second);
                *self.base.counts.entry(key).or_insert(0) += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::database::WritableDatabase;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc_with(terms: &[&str]) -> Document {
        let mut doc = Document::new();
        for term in terms {
            doc.add_term(&format!("t\t{}", term), 1);
        }
        doc
    }

    fn db_from(dir: &TempDir, docs: &[Document]) -> Database {
        let path = dir.path().join("shard");
        let mut w = WritableDatabase::open(&path).unwrap();
        for doc in docs {
            w.add_document(doc.clone());
        }
        w.commit().unwrap();
        Database::open(&path).unwrap()
    }

    #[test]
    fn test_occur_counts_and_order() {
        let dir = TempDir::new().unwrap();
        let db = db_from(
            &dir,
            &[
                doc_with(&["apple", "banana"]),
                doc_with(&["apple", "cherry"]),
                doc_with(&["apple", "banana", "date"]),
            ],
        );

        let mut spy = TermOccurSpy::new("t", 1000, 3, true);
        for (_, _, doc) in db.docs() {
            spy.on_document(doc, 1.0);
        }
        let result = spy.result(&db);
        assert_eq!(result["type"], "occur");
        assert_eq!(result["prefix"], "t");
        assert_eq!(result["docs_seen"], 3);
        assert_eq!(result["terms_seen"], 7);
        // apple 3x, banana 2x, then ties broken in ascending term order.
        assert_eq!(
            result["counts"],
            json!([["apple", 3, 3], ["banana", 2, 2], ["cherry", 1, 1]])
        );
    }

    #[test]
    fn test_occur_doc_limit_zero() {
        let dir = TempDir::new().unwrap();
        let db = db_from(&dir, &[doc_with(&["apple"])]);
        let mut spy = TermOccurSpy::new("t", 0, 10, false);
        for (_, _, doc) in db.docs() {
            spy.on_document(doc, 1.0);
        }
        let result = spy.result(&db);
        assert_eq!(result["docs_seen"], 0);
        assert_eq!(result["counts"], json!([]));
    }

    #[test]
    fn test_occur_stopwords() {
        let dir = TempDir::new().unwrap();
        let db = db_from(&dir, &[doc_with(&["apple", "the"])]);
        let mut spy = TermOccurSpy::new("t", 10, 10, false);
        spy.add_stopword("the");
        for (_, _, doc) in db.docs() {
            spy.on_document(doc, 1.0);
        }
        let result = spy.result(&db);
        assert_eq!(result["counts"], json!([["apple", 1]]));
        assert_eq!(result["terms_seen"], 1);
    }

    #[test]
    fn test_cooccur_pairs() {
        let dir = TempDir::new().unwrap();
        let db = db_from(
            &dir,
            &[
                doc_with(&["apple", "banana", "cherry"]),
                doc_with(&["apple", "banana"]),
            ],
        );
        let mut spy = TermCoOccurSpy::new("t", 1000, 10, false);
        for (_, _, doc) in db.docs() {
            spy.on_document(doc, 1.0);
        }
        let result = spy.result(&db);
        assert_eq!(result["type"], "cooccur");
        assert_eq!(
            result["counts"],
            json!([
                ["apple", "banana", 2],
                ["apple", "cherry", 1],
                ["banana", "cherry", 1]
            ])
        );
    }

    #[test]
    fn test_empty_prefix_counts_all_terms() {
        let dir = TempDir::new().unwrap();
        let db = db_from(&dir, &[doc_with(&["apple"])]);
        let mut spy = TermOccurSpy::new("", 10, 10, false);
        for (_, _, doc) in db.docs() {
            spy.on_document(doc, 1.0);
        }
        let result = spy.result(&db);
        assert_eq!(result["counts"], json!([["t\tapple", 1]]));
    }
}
