use serde::{Deserialize, Serialize};

/// Policy for a field value exceeding its configured maximum length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TooLongAction {
    /// Abort indexing the document with an error record.
    Error,
    /// Replace the tail beyond the limit with a deterministic hash.
    Hash,
    /// Hard-cut at the limit.
    Truncate,
}

/// A value slot, given either as a number or as a name. Names resolve to
/// the high slot range so they cannot collide with hand-assigned numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotSpec {
    Number(u32),
    Name(String),
}

impl SlotSpec {
    pub fn resolve(&self) -> u32 {
        match self {
            SlotSpec::Number(n) => *n,
            SlotSpec::Name(name) => crc32fast::hash(name.as_bytes()) | 0x8000_0000,
        }
    }

    fn expand(&self, capture: &str) -> SlotSpec {
        match self {
            SlotSpec::Number(n) => SlotSpec::Number(*n),
            SlotSpec::Name(name) => SlotSpec::Name(name.replace('*', capture)),
        }
    }
}

fn default_id_max_length() -> usize {
    64
}

fn default_exact_max_length() -> usize {
    64
}

fn default_cat_max_length() -> usize {
    32
}

fn no_limit() -> usize {
    0
}

fn action_error() -> TooLongAction {
    TooLongAction::Error
}

fn action_hash() -> TooLongAction {
    TooLongAction::Hash
}

fn action_truncate() -> TooLongAction {
    TooLongAction::Truncate
}

fn one() -> u32 {
    1
}

/// Per-field indexing configuration, tagged by `type` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldConfig {
    /// The document id: contributes the unique id term.
    Id {
        #[serde(default)]
        store_field: String,
        #[serde(default = "default_id_max_length")]
        max_length: usize,
        #[serde(default = "action_error")]
        too_long_action: TooLongAction,
    },
    /// An exactly-matched term under a prefix.
    Exact {
        prefix: String,
        #[serde(default)]
        store_field: String,
        #[serde(default = "default_exact_max_length")]
        max_length: usize,
        #[serde(default = "action_error")]
        too_long_action: TooLongAction,
        #[serde(default = "one")]
        wdfinc: u32,
    },
    /// Free text, tokenised with positional postings.
    Text {
        prefix: String,
        #[serde(default)]
        store_field: String,
        #[serde(default)]
        processor: String,
        #[serde(default = "no_limit")]
        max_length: usize,
        #[serde(default = "action_truncate")]
        too_long_action: TooLongAction,
    },
    /// A numeric timestamp stored in a value slot for range searches.
    Timestamp {
        slot: SlotSpec,
        #[serde(default)]
        store_field: String,
    },
    /// A categorical value; ancestor categories are indexed alongside.
    Cat {
        prefix: String,
        #[serde(default)]
        store_field: String,
        #[serde(default = "default_cat_max_length")]
        max_length: usize,
        #[serde(default = "action_hash")]
        too_long_action: TooLongAction,
        /// Hierarchy to expand ancestors from; defaults to the field name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hierarchy: Option<String>,
    },
    /// Stored for display only; not searchable.
    Stored {
        store_field: String,
    },
    /// Presence and error flags for the other fields in the document.
    Meta {
        prefix: String,
        slot: SlotSpec,
    },
}

impl FieldConfig {
    pub fn store_field(&self) -> &str {
        match self {
            FieldConfig::Id { store_field, .. }
            | FieldConfig::Exact { store_field, .. }
            | FieldConfig::Text { store_field, .. }
            | FieldConfig::Timestamp { store_field, .. }
            | FieldConfig::Cat { store_field, .. }
            | FieldConfig::Stored { store_field } => store_field,
            FieldConfig::Meta { .. } => "",
        }
    }

    /// Substitute a pattern capture into the config's expandable
    /// attributes.
    pub fn expand(&self, capture: &str) -> FieldConfig {
        let mut expanded = self.clone();
        match &mut expanded {
            FieldConfig::Id { store_field, .. } => {
                *store_field = store_field.replace('*', capture);
            }
            FieldConfig::Exact {
                prefix, store_field, ..
            }
            | FieldConfig::Text {
                prefix, store_field, ..
            }
            | FieldConfig::Cat {
                prefix, store_field, ..
            } => {
                *prefix = prefix.replace('*', capture);
                *store_field = store_field.replace('*', capture);
            }
            FieldConfig::Timestamp { slot, store_field } => {
                *slot = slot.expand(capture);
                *store_field = store_field.replace('*', capture);
            }
            FieldConfig::Stored { store_field } => {
                *store_field = store_field.replace('*', capture);
            }
            FieldConfig::Meta { prefix, slot } => {
                *prefix = prefix.replace('*', capture);
                *slot = slot.expand(capture);
            }
        }
        expanded
    }
}

/// Match a glob (containing at most one `*`) against a field name,
/// returning the captured middle on success.
pub fn glob_match(glob: &str, name: &str) -> Option<String> {
    match glob.find('*') {
        None => {
            if glob == name {
                Some(String::new())
            } else {
                None
            }
        }
        Some(pos) => {
            let (head, tail) = (&glob[..pos], &glob[pos + 1..]);
            if name.len() >= head.len() + tail.len()
                && name.starts_with(head)
                && name.ends_with(tail)
            {
                Some(name[head.len()..name.len() - tail.len()].to_string())
            } else {
                None
            }
        }
    }
}
