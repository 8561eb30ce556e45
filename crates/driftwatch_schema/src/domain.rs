//! Domain Manager
//!
//! Owns every [`StringDomain`] of a schema. Features refer to domains by
//! name only, so this table is the single place a name is turned into
//! values.
//!
//! # Invariants
//!
//! - Domain names never collide (aliases count as taken names)
//! - Values inside a domain are unique and keep insertion order
//! - Values are never removed; merging only moves them into the survivor
//!
//! # Merging
//!
//! Merged-away domains leave an alias `old name -> surviving name` behind.
//! Features keep pointing at the old name and resolve through the alias,
//! so a merge never has to walk the feature list.

use driftwatch_protocol::StringDomain;
use std::collections::{HashMap, HashSet};

use crate::error::{Result, SchemaError};

/// Pick `candidate` if free, else the first free `candidate2`, `candidate3`, ...
///
/// Pure: nothing is reserved until the caller creates the domain.
pub fn unique_name(candidate: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(candidate) {
        return candidate.to_string();
    }
    let mut suffix: u64 = 2;
    loop {
        let name = format!("{}{}", candidate, suffix);
        if !is_taken(&name) {
            return name;
        }
        suffix += 1;
    }
}

#[derive(Debug, Clone)]
struct DomainEntry {
    domain: StringDomain,
    seen: HashSet<String>,
}

impl DomainEntry {
    fn new(name: String, values: Vec<String>) -> Self {
        let mut entry = Self {
            domain: StringDomain::new(name),
            seen: HashSet::new(),
        };
        for value in values {
            entry.push(&value);
        }
        entry
    }

    fn push(&mut self, value: &str) -> bool {
        if self.seen.contains(value) {
            return false;
        }
        self.seen.insert(value.to_string());
        self.domain.values.push(value.to_string());
        true
    }
}

/// Name-indexed table of string domains plus the alias table left by merges.
#[derive(Debug, Clone, Default)]
pub struct DomainTable {
    entries: Vec<DomainEntry>,
    index: HashMap<String, usize>,
    aliases: HashMap<String, String>,
}

impl DomainTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.aliases.clear();
    }

    /// Follow aliases to the live domain name. Unknown names resolve to themselves.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        // Aliases are flattened on merge; the bound only guards against cycles.
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }

    fn is_taken(&self, name: &str) -> bool {
        self.index.contains_key(name) || self.aliases.contains_key(name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(self.resolve(name)).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Lookup only. Absence is not an error.
    pub fn get_existing(&self, name: &str) -> Option<&StringDomain> {
        self.position(name).map(|idx| &self.entries[idx].domain)
    }

    /// Always creates a new, empty domain under a name no other domain uses.
    ///
    /// If `candidate` is taken, probes `candidate2`, `candidate3`, ...
    pub fn get_new(&mut self, candidate: &str) -> &StringDomain {
        let name = unique_name(candidate, |n| self.is_taken(n));
        self.push_entry(DomainEntry::new(name, Vec::new()))
    }

    /// Returns the domain named `name`, creating it under exactly that name if missing.
    pub fn get_or_create(&mut self, name: &str) -> &StringDomain {
        match self.position(name) {
            Some(idx) => &self.entries[idx].domain,
            None => self.push_entry(DomainEntry::new(name.to_string(), Vec::new())),
        }
    }

    /// Append unseen values in order. Returns the values actually added, or
    /// `None` if the domain does not exist.
    pub fn extend<'v, I>(&mut self, name: &str, values: I) -> Option<Vec<String>>
    where
        I: IntoIterator<Item = &'v str>,
    {
        let idx = self.position(name)?;
        let entry = &mut self.entries[idx];
        let mut added = Vec::new();
        for value in values {
            if entry.push(value) {
                added.push(value.to_string());
            }
        }
        Some(added)
    }

    /// Insert a fully formed domain (used when hydrating a schema).
    /// Duplicate values are dropped, first occurrence wins.
    pub fn insert(&mut self, domain: StringDomain) -> Result<()> {
        if domain.name.is_empty() {
            return Err(SchemaError::InvalidSchema(
                "string domain name cannot be empty".to_string(),
            ));
        }
        if self.is_taken(&domain.name) {
            return Err(SchemaError::InvalidSchema(format!(
                "duplicate string domain name: '{}'",
                domain.name
            )));
        }
        self.push_entry(DomainEntry::new(domain.name, domain.values));
        Ok(())
    }

    /// Fold every domain in `sources` into `target`.
    ///
    /// Validates all names before touching anything. Returns how many
    /// domains were absorbed (sources already resolving to `target` are skipped).
    pub fn merge(&mut self, target: &str, sources: &[String]) -> Result<usize> {
        let target_name = self.resolve(target).to_string();
        if !self.index.contains_key(&target_name) {
            return Err(SchemaError::InvalidSchema(format!(
                "cannot merge into unknown string domain '{}'",
                target
            )));
        }

        let mut absorbed: Vec<String> = Vec::new();
        for source in sources {
            let source_name = self.resolve(source).to_string();
            if source_name == target_name || absorbed.contains(&source_name) {
                continue;
            }
            if !self.index.contains_key(&source_name) {
                return Err(SchemaError::InvalidSchema(format!(
                    "cannot merge unknown string domain '{}'",
                    source
                )));
            }
            absorbed.push(source_name);
        }
        if absorbed.is_empty() {
            return Ok(0);
        }

        let moved: Vec<String> = absorbed
            .iter()
            .flat_map(|name| self.entries[self.index[name]].domain.values.clone())
            .collect();

        self.entries.retain(|e| !absorbed.contains(&e.domain.name));
        self.rebuild_index();
        self.extend(&target_name, moved.iter().map(String::as_str));

        for alias_target in self.aliases.values_mut() {
            if absorbed.contains(alias_target) {
                *alias_target = target_name.clone();
            }
        }
        for name in &absorbed {
            self.aliases.insert(name.clone(), target_name.clone());
        }
        Ok(absorbed.len())
    }

    /// Live domains in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &StringDomain> {
        self.entries.iter().map(|e| &e.domain)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.domain.name.as_str())
    }

    pub fn to_vec(&self) -> Vec<StringDomain> {
        self.iter().cloned().collect()
    }

    fn push_entry(&mut self, entry: DomainEntry) -> &StringDomain {
        let idx = self.entries.len();
        self.index.insert(entry.domain.name.clone(), idx);
        self.entries.push(entry);
        &self.entries[idx].domain
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.domain.name.clone(), idx))
            .collect();
    }
}
