use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::core::error::{Error, Result};

/// An n-gram frequency profile: n-grams ranked most-frequent first, ties
/// in ascending n-gram order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NGramProfile {
    max_ngrams: usize,
    ngrams: Vec<String>,
}

impl NGramProfile {
    /// Build a ranked profile from a text.
    ///
    /// The text is lowercased and split on whitespace; each word is
    /// padded as `|word|` and all character n-grams of length
    /// 1..=`max_ngram_length` are counted.
    pub fn build(text: &str, max_ngram_length: usize, max_ngrams: usize) -> Self {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for word in text.to_lowercase().split_whitespace() {
            let padded: Vec<char> = std::iter::once('|')
                .chain(word.chars())
                .chain(std::iter::once('|'))
                .collect();
            for start in 0..padded.len() {
                for len in 1..=max_ngram_length {
                    if start + len > padded.len() {
                        break;
                    }
                    let ngram: String = padded[start..start + len].iter().collect();
                    *counts.entry(ngram).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_ngrams);

        NGramProfile {
            max_ngrams,
            ngrams: ranked.into_iter().map(|(ngram, _)| ngram).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ngrams.is_empty()
    }

    fn rank_of(&self, ngram: &str) -> Option<usize> {
        self.ngrams.iter().position(|n| n == ngram)
    }

    /// Rank-distance from this (input) profile to a target profile.
    /// Absent n-grams cost the full `max_ngrams` penalty.
    fn distance(&self, target: &NGramProfile) -> u64 {
        let penalty = self.max_ngrams as u64;
        self.ngrams
            .iter()
            .enumerate()
            .map(|(rank, ngram)| match target.rank_of(ngram) {
                Some(target_rank) => (rank as i64 - target_rank as i64).unsigned_abs(),
                None => penalty,
            })
            .sum()
    }

    fn to_json(&self) -> Value {
        json!({
            "max_ngrams": self.max_ngrams,
            "ngrams": self.ngrams,
        })
    }

    fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("ngram profile must be an object"))?;
        let max_ngrams = obj
            .get("max_ngrams")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::invalid_value("ngram profile lacks max_ngrams"))?
            as usize;
        let ngrams = obj
            .get("ngrams")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::invalid_value("ngram profile lacks ngrams"))?
            .iter()
            .map(|n| {
                n.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::invalid_value("ngrams must be strings"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(NGramProfile { max_ngrams, ngrams })
    }
}

/// An `ngram_rank` language categoriser: text in, ranked category labels
/// out. Ambiguous texts (more close candidates than `max_candidates`)
/// yield an empty result.
#[derive(Debug, Clone, PartialEq)]
pub struct Categoriser {
    accuracy_threshold: f64,
    max_ngram_length: usize,
    max_ngrams: usize,
    max_candidates: usize,
    profiles: BTreeMap<String, NGramProfile>,
}

impl Categoriser {
    pub fn new(
        accuracy_threshold: f64,
        max_ngram_length: usize,
        max_ngrams: usize,
        max_candidates: usize,
    ) -> Self {
        Categoriser {
            accuracy_threshold,
            max_ngram_length,
            max_ngrams,
            max_candidates,
            profiles: BTreeMap::new(),
        }
    }

    /// Train a target profile from reference text.
    pub fn add_target_profile(&mut self, name: &str, text: &str) {
        let profile = NGramProfile::build(text, self.max_ngram_length, self.max_ngrams);
        self.profiles.insert(name.to_string(), profile);
    }

    /// Categorise a text, returning the closest category labels (best
    /// first), or an empty list when the text is empty or ambiguous.
    pub fn categorise(&self, text: &str) -> Vec<String> {
        let input = NGramProfile::build(text, self.max_ngram_length, self.max_ngrams);
        if input.is_empty() || self.profiles.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(&str, u64)> = self
            .profiles
            .iter()
            .map(|(name, profile)| (name.as_str(), input.distance(profile)))
            .collect();
        scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let best = scored[0].1;
        let cutoff = best as f64 * self.accuracy_threshold;
        let candidates: Vec<String> = scored
            .into_iter()
            .take_while(|(_, distance)| *distance as f64 <= cutoff)
            .map(|(name, _)| name.to_string())
            .collect();

        if candidates.len() > self.max_candidates {
            // Too many close categories: the text is ambiguous.
            return Vec::new();
        }
        candidates
    }

    pub fn to_json(&self) -> Value {
        let mut profiles = Map::new();
        for (name, profile) in &self.profiles {
            profiles.insert(name.clone(), profile.to_json());
        }
        json!({
            "type": "ngram_rank",
            "accuracy_threshold": self.accuracy_threshold,
            "max_ngram_length": self.max_ngram_length,
            "max_ngrams": self.max_ngrams,
            "max_candidates": self.max_candidates,
            "profiles": profiles,
        })
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("categoriser must be an object"))?;
        match obj.get("type").and_then(Value::as_str) {
            Some("ngram_rank") => {}
            Some(other) => {
                return Err(Error::invalid_value(format!(
                    "unknown categoriser type '{}'",
                    other
                )))
            }
            None => return Err(Error::invalid_value("categoriser lacks a type")),
        }
        let accuracy_threshold = obj
            .get("accuracy_threshold")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::invalid_value("categoriser lacks accuracy_threshold"))?;
        let max_ngram_length = obj
            .get("max_ngram_length")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::invalid_value("categoriser lacks max_ngram_length"))?
            as usize;
        let max_ngrams = obj
            .get("max_ngrams")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::invalid_value("categoriser lacks max_ngrams"))?
            as usize;
        let max_candidates = obj
            .get("max_candidates")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::invalid_value("categoriser lacks max_candidates"))?
            as usize;
        let mut categoriser = Categoriser::new(
            accuracy_threshold,
            max_ngram_length,
            max_ngrams,
            max_candidates,
        );
        if let Some(profiles) = obj.get("profiles") {
            let profiles = profiles
                .as_object()
                .ok_or_else(|| Error::invalid_value("categoriser profiles must be an object"))?;
            for (name, profile) in profiles {
                categoriser
                    .profiles
                    .insert(name.clone(), NGramProfile::from_json(profile)?);
            }
        }
        Ok(categoriser)
    }
}
