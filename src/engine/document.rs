use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document id within one shard.
pub type DocId = u32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub wdf: u32,
    pub positions: Vec<u32>,
}

/// A document as stored by the engine: opaque per-field display data,
/// terms with within-document frequencies and optional positions, and
/// value slots holding encoded multi-entry byte strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    data: BTreeMap<String, String>,
    terms: BTreeMap<String, TermEntry>,
    values: BTreeMap<u32, Vec<u8>>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    /// Add a term, increasing its wdf by `wdfinc`.
    pub fn add_term(&mut self, term: &str, wdfinc: u32) {
        let entry = self.terms.entry(term.to_string()).or_default();
        entry.wdf += wdfinc;
    }

    /// Add a positional posting for a term.
    pub fn add_posting(&mut self, term: &str, position: u32, wdfinc: u32) {
        let entry = self.terms.entry(term.to_string()).or_default();
        entry.wdf += wdfinc;
        entry.positions.push(position);
    }

    pub fn remove_term(&mut self, term: &str) {
        self.terms.remove(term);
    }

    pub fn has_term(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn term(&self, term: &str) -> Option<&TermEntry> {
        self.terms.get(term)
    }

    /// Terms in lexicographic order.
    pub fn terms(&self) -> impl Iterator<Item = (&String, &TermEntry)> {
        self.terms.iter()
    }

    /// Terms from the first term >= `start`, in lexicographic order.
    pub fn terms_from<'a>(
        &'a self,
        start: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a TermEntry)> + 'a {
        self.terms.range(start.to_string()..).map(|(t, e)| (t, e))
    }

    pub fn set_data_field(&mut self, field: &str, serialised: String) {
        self.data.insert(field.to_string(), serialised);
    }

    pub fn data_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).map(|s| s.as_str())
    }

    pub fn data_fields(&self) -> impl Iterator<Item = (&String, &String)> {
        self.data.iter()
    }

    /// Append an already-encoded entry sequence to a value slot.
    pub fn append_value(&mut self, slot: u32, encoded: &[u8]) {
        self.values.entry(slot).or_default().extend_from_slice(encoded);
    }

    pub fn value(&self, slot: u32) -> Option<&[u8]> {
        self.values.get(&slot).map(|v| v.as_slice())
    }

    pub fn values(&self) -> impl Iterator<Item = (&u32, &Vec<u8>)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.terms.is_empty() && self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_accumulation() {
        let mut doc = Document::new();
        doc.add_term("t\thello", 1);
        doc.add_term("t\thello", 1);
        doc.add_posting("t\tworld", 0, 1);
        assert_eq!(doc.term("t\thello").unwrap().wdf, 2);
        assert_eq!(doc.term("t\tworld").unwrap().positions, vec![0]);
        assert!(!doc.has_term("t\tmissing"));
    }

    #[test]
    fn test_terms_sorted() {
        let mut doc = Document::new();
        doc.add_term("b", 1);
        doc.add_term("a", 1);
        doc.add_term("c", 0);
        let terms: Vec<&String> = doc.terms().map(|(t, _)| t).collect();
        assert_eq!(terms, ["a", "b", "c"]);
    }

    #[test]
    fn test_terms_from() {
        let mut doc = Document::new();
        doc.add_term("g\tx", 1);
        doc.add_term("t\ta", 1);
        doc.add_term("t\tb", 1);
        let terms: Vec<&String> = doc.terms_from("t\t").map(|(t, _)| t).collect();
        assert_eq!(terms, ["t\ta", "t\tb"]);
    }
}
