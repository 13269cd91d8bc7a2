use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::core::error::{Error, Result};

/// A set of category names, used to report which categories were touched
/// by a hierarchy mutation.
pub type Categories = BTreeSet<String>;

#[derive(Debug, Clone, Default, PartialEq)]
struct Category {
    parents: BTreeSet<String>,
    children: BTreeSet<String>,
}

/// A directed hierarchy of categories. Documents indexed against a
/// category also match searches for any of its ancestors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryHierarchy {
    categories: BTreeMap<String, Category>,
}

impl CategoryHierarchy {
    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    /// Add a category; reports it in `modified` if it was new.
    pub fn add(&mut self, name: &str, modified: &mut Categories) {
        if !self.categories.contains_key(name) {
            self.categories.insert(name.to_string(), Category::default());
            modified.insert(name.to_string());
        }
    }

    /// Remove a category, unlinking it from parents and children. Every
    /// descendant whose ancestor set changes is reported.
    pub fn remove(&mut self, name: &str, modified: &mut Categories) {
        let entry = match self.categories.remove(name) {
            Some(entry) => entry,
            None => return,
        };
        modified.insert(name.to_string());
        for descendant in self.descendants_of(&entry.children) {
            modified.insert(descendant);
        }
        for parent in &entry.parents {
            if let Some(p) = self.categories.get_mut(parent) {
                p.children.remove(name);
            }
        }
        for child in &entry.children {
            if let Some(c) = self.categories.get_mut(child) {
                c.parents.remove(name);
            }
        }
    }

    /// Link `child` under `parent`, creating either as needed.
    pub fn add_parent(&mut self, child: &str, parent: &str, modified: &mut Categories) {
        self.add(child, modified);
        self.add(parent, modified);
        let inserted = self
            .categories
            .get_mut(parent)
            .map(|p| p.children.insert(child.to_string()))
            .unwrap_or(false);
        if let Some(c) = self.categories.get_mut(child) {
            c.parents.insert(parent.to_string());
        }
        if inserted {
            modified.insert(child.to_string());
            for descendant in self.descendants(child) {
                modified.insert(descendant);
            }
        }
    }

    pub fn remove_parent(&mut self, child: &str, parent: &str, modified: &mut Categories) {
        let removed = self
            .categories
            .get_mut(parent)
            .map(|p| p.children.remove(child))
            .unwrap_or(false);
        if let Some(c) = self.categories.get_mut(child) {
            c.parents.remove(parent);
        }
        if removed {
            modified.insert(child.to_string());
            for descendant in self.descendants(child) {
                modified.insert(descendant);
            }
        }
    }

    /// Transitive ancestors of a category (not including itself).
    pub fn ancestors(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: Vec<&str> = match self.categories.get(name) {
            Some(entry) => entry.parents.iter().map(String::as_str).collect(),
            None => return seen,
        };
        while let Some(current) = queue.pop() {
            if seen.insert(current.to_string()) {
                if let Some(entry) = self.categories.get(current) {
                    queue.extend(entry.parents.iter().map(String::as_str));
                }
            }
        }
        seen
    }

    fn descendants(&self, name: &str) -> BTreeSet<String> {
        match self.categories.get(name) {
            Some(entry) => self.descendants_of(&entry.children),
            None => BTreeSet::new(),
        }
    }

    fn descendants_of(&self, start: &BTreeSet<String>) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: Vec<&str> = start.iter().map(String::as_str).collect();
        while let Some(current) = queue.pop() {
            if seen.insert(current.to_string()) {
                if let Some(entry) = self.categories.get(current) {
                    queue.extend(entry.children.iter().map(String::as_str));
                }
            }
        }
        seen
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_value("category hierarchy must be an object"))?;
        let mut hierarchy = CategoryHierarchy::default();
        let mut modified = Categories::new();
        for (name, parents) in obj {
            hierarchy.add(name, &mut modified);
            let parents = parents.as_array().ok_or_else(|| {
                Error::invalid_value("category parents must be an array of names")
            })?;
            for parent in parents {
                let parent = parent.as_str().ok_or_else(|| {
                    Error::invalid_value("category parent names must be strings")
                })?;
                hierarchy.add_parent(name, parent, &mut modified);
            }
        }
        Ok(hierarchy)
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (name, entry) in &self.categories {
            obj.insert(
                name.clone(),
                Value::Array(
                    entry
                        .parents
                        .iter()
                        .map(|p| Value::String(p.clone()))
                        .collect(),
                ),
            );
        }
        Value::Object(obj)
    }
}
