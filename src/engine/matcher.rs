use std::collections::BTreeMap;

use crate::core::error::{Error, Result};
use crate::engine::database::Database;
use crate::engine::document::{DocId, Document};
use crate::engine::query::Query;
use crate::engine::serialise;

/// A streaming observer invoked once per matching document.
///
/// The matcher borrows the observer for the duration of a run and hands
/// it back to the caller afterwards; implementations accumulate whatever
/// state they need and serialise it later.
pub trait MatchObserver {
    fn on_document(&mut self, doc: &Document, score: f64);
}

#[derive(Debug, Clone)]
pub struct MatchItem {
    pub score: f64,
    pub doc: Document,
}

#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    pub matches_lower_bound: u64,
    pub matches_estimated: u64,
    pub matches_upper_bound: u64,
    pub items: Vec<MatchItem>,
}

type DocKey = (usize, DocId);

fn term_weight(db: &Database, key: DocKey, term: &str) -> f64 {
    db.fetch(key.0, key.1)
        .and_then(|doc| doc.term(term))
        .map(|entry| entry.wdf as f64)
        .unwrap_or(0.0)
}

fn eval(db: &Database, query: &Query) -> Result<BTreeMap<DocKey, f64>> {
    let mut out = BTreeMap::new();
    match query {
        Query::MatchAll => {
            for (shard, docid, _) in db.docs() {
                out.insert((shard, docid), 0.0);
            }
        }
        Query::MatchNothing => {}
        Query::Term(term) => {
            for (shard_idx, shard) in db.shards().iter().enumerate() {
                for docid in shard.postlist(term) {
                    let key = (shard_idx, docid);
                    out.insert(key, term_weight(db, key, term));
                }
            }
        }
        Query::Or(children) => {
            for child in children {
                for (key, weight) in eval(db, child)? {
                    *out.entry(key).or_insert(0.0) += weight;
                }
            }
        }
        Query::And(children) => {
            let mut iter = children.iter();
            let first = match iter.next() {
                Some(q) => q,
                None => return Err(Error::invalid_value("empty \"and\" query")),
            };
            out = eval(db, first)?;
            for child in iter {
                let sub = eval(db, child)?;
                out.retain(|key, _| sub.contains_key(key));
                for (key, weight) in sub {
                    if let Some(acc) = out.get_mut(&key) {
                        *acc += weight;
                    }
                }
            }
        }
        Query::Filter(children) => {
            let mut iter = children.iter();
            let first = match iter.next() {
                Some(q) => q,
                None => return Err(Error::invalid_value("empty \"filter\" query")),
            };
            out = eval(db, first)?;
            for child in iter {
                let sub = eval(db, child)?;
                out.retain(|key, _| sub.contains_key(key));
            }
        }
        Query::Scale { factor, query } => {
            out = eval(db, query)?;
            for weight in out.values_mut() {
                *weight *= factor;
            }
        }
        Query::ValueRange { slot, begin, end } => {
            for (shard_idx, shard) in db.shards().iter().enumerate() {
                for docid in shard.slot_docs(*slot) {
                    let doc = match shard.get_document(docid) {
                        Some(d) => d,
                        None => continue,
                    };
                    if let Some(encoded) = doc.value(*slot) {
                        if serialise::any_entry_in_range(encoded, begin, end)? {
                            out.insert((shard_idx, docid), 0.0);
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Run a query over the database, invoking each observer on every
/// matching document in document order, and return the hits in
/// [from, from + size) ordered by descending score (ties in document
/// order).
pub fn run_match(
    db: &Database,
    query: &Query,
    from: usize,
    size: usize,
    observers: &mut [&mut dyn MatchObserver],
) -> Result<MatchSet> {
    let matched = eval(db, query)?;
    let total = matched.len() as u64;

    for (key, score) in &matched {
        if let Some(doc) = db.fetch(key.0, key.1) {
            for observer in observers.iter_mut() {
                observer.on_document(doc, *score);
            }
        }
    }

    let mut ranked: Vec<(DocKey, f64)> = matched.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let items = ranked
        .into_iter()
        .skip(from)
        .take(size)
        .filter_map(|(key, score)| {
            db.fetch(key.0, key.1).map(|doc| MatchItem {
                score,
                doc: doc.clone(),
            })
        })
        .collect();

    Ok(MatchSet {
        matches_lower_bound: total,
        matches_estimated: total,
        matches_upper_bound: total,
        items,
    })
}
