//! Fingerprint-indexed collections of parsed records

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;

use crate::consensus::RouterStatusEntry;
use crate::descriptor::Descriptor;
use crate::error::MergeError;
use crate::fingerprint::Fingerprint;
use crate::record::{ParseRecord, Record};
use crate::sniff::DocumentKind;

/// Document-level information copied from header and footer lines.
///
/// Only consensus documents carry any of this; for descriptor files
/// everything stays empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub valid_after: Option<DateTime<Utc>>,
    pub fresh_until: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub known_flags: Vec<String>,
    pub params: BTreeMap<String, i64>,
    pub bandwidth_weights: BTreeMap<String, i64>,
}

impl DocumentInfo {
    /// Take over every field that is set in `newer`.
    fn update(&mut self, newer: DocumentInfo) {
        if newer.valid_after.is_some() {
            self.valid_after = newer.valid_after;
        }
        if newer.fresh_until.is_some() {
            self.fresh_until = newer.fresh_until;
        }
        if newer.valid_until.is_some() {
            self.valid_until = newer.valid_until;
        }
        if !newer.known_flags.is_empty() {
            self.known_flags = newer.known_flags;
        }
        if !newer.params.is_empty() {
            self.params = newer.params;
        }
        if !newer.bandwidth_weights.is_empty() {
            self.bandwidth_weights = newer.bandwidth_weights;
        }
    }
}

/// Records of one kind, keyed by fingerprint.
///
/// Iteration follows insertion order. Fingerprints are unique: inserting a
/// record whose fingerprint is already present replaces the old record but
/// keeps its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<R> {
    kind: DocumentKind,
    info: DocumentInfo,
    records: IndexMap<Fingerprint, R>,
}

impl<R: ParseRecord> Collection<R> {
    pub fn new() -> Collection<R> {
        Collection {
            kind: R::KIND,
            info: DocumentInfo::default(),
            records: IndexMap::new(),
        }
    }
}

impl<R: ParseRecord> Default for Collection<R> {
    fn default() -> Self {
        Collection::new()
    }
}

impl<R: Record> Collection<R> {
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Look up the record with the given fingerprint.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&R> {
        self.records.get(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.records.contains_key(fingerprint)
    }

    /// Number of distinct fingerprints
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in insertion order
    pub fn iter(&self) -> indexmap::map::Values<'_, Fingerprint, R> {
        self.records.values()
    }

    pub fn fingerprints(&self) -> indexmap::map::Keys<'_, Fingerprint, R> {
        self.records.keys()
    }

    /// Merge all records of `other` into this collection.
    ///
    /// The policy is last-writer-wins: a record of `other` replaces a record
    /// of `self` with the same fingerprint, in place. Records only present in
    /// `other` are appended in `other`'s order, and records only present in
    /// `self` are kept. Document information set in `other` replaces ours.
    ///
    /// Both collections hold the same record type and thus the same kind;
    /// see [`AnyCollection::merge`] for collections of unknown kind.
    pub fn merge(&mut self, other: Collection<R>) {
        let before = self.records.len();
        let incoming = other.records.len();
        self.records.extend(other.records);
        self.info.update(other.info);
        debug!(
            kind = %self.kind,
            incoming,
            added = self.records.len() - before,
            "merged collections"
        );
    }

    /// Insert a record, returning the one it replaced.
    pub(crate) fn insert(&mut self, record: R) -> Option<R> {
        self.records.insert(*record.fingerprint(), record)
    }

    pub(crate) fn set_info(&mut self, info: DocumentInfo) {
        self.info = info;
    }
}

impl<R: ParseRecord> FromIterator<R> for Collection<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        let mut collection = Collection::new();
        collection.extend(iter);
        collection
    }
}

impl<R: Record> Extend<R> for Collection<R> {
    fn extend<I: IntoIterator<Item = R>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl<R> IntoIterator for Collection<R> {
    type Item = R;
    type IntoIter = indexmap::map::IntoValues<Fingerprint, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

impl<'a, R> IntoIterator for &'a Collection<R> {
    type Item = &'a R;
    type IntoIter = indexmap::map::Values<'a, Fingerprint, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

/// A collection whose kind is only known at runtime, as returned when
/// parsing a document of unknown kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyCollection {
    Consensus(Collection<RouterStatusEntry>),
    Descriptors(Collection<Descriptor>),
}

impl AnyCollection {
    pub fn kind(&self) -> DocumentKind {
        match self {
            AnyCollection::Consensus(c) => c.kind(),
            AnyCollection::Descriptors(c) => c.kind(),
        }
    }

    pub fn info(&self) -> &DocumentInfo {
        match self {
            AnyCollection::Consensus(c) => c.info(),
            AnyCollection::Descriptors(c) => c.info(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnyCollection::Consensus(c) => c.len(),
            AnyCollection::Descriptors(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&dyn Record> {
        match self {
            AnyCollection::Consensus(c) => c.get(fingerprint).map(|r| r as &dyn Record),
            AnyCollection::Descriptors(c) => c.get(fingerprint).map(|r| r as &dyn Record),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &dyn Record> + '_> {
        match self {
            AnyCollection::Consensus(c) => Box::new(c.iter().map(|r| r as &dyn Record)),
            AnyCollection::Descriptors(c) => Box::new(c.iter().map(|r| r as &dyn Record)),
        }
    }

    /// Merge a copy of `other` into this collection, see [`Collection::merge`].
    ///
    /// Fails without touching either collection if the kinds differ.
    pub fn merge(&mut self, other: &AnyCollection) -> Result<(), MergeError> {
        match (self, other) {
            (AnyCollection::Consensus(ours), AnyCollection::Consensus(theirs)) => {
                ours.merge(theirs.clone());
                Ok(())
            }
            (AnyCollection::Descriptors(ours), AnyCollection::Descriptors(theirs)) => {
                ours.merge(theirs.clone());
                Ok(())
            }
            (ours, theirs) => Err(MergeError::KindMismatch {
                expected: ours.kind(),
                found: theirs.kind(),
            }),
        }
    }

    pub fn as_consensus(&self) -> Option<&Collection<RouterStatusEntry>> {
        match self {
            AnyCollection::Consensus(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_descriptors(&self) -> Option<&Collection<Descriptor>> {
        match self {
            AnyCollection::Descriptors(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_consensus(self) -> Option<Collection<RouterStatusEntry>> {
        match self {
            AnyCollection::Consensus(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_descriptors(self) -> Option<Collection<Descriptor>> {
        match self {
            AnyCollection::Descriptors(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Collection<RouterStatusEntry>> for AnyCollection {
    fn from(c: Collection<RouterStatusEntry>) -> Self {
        AnyCollection::Consensus(c)
    }
}

impl From<Collection<Descriptor>> for AnyCollection {
    fn from(c: Collection<Descriptor>) -> Self {
        AnyCollection::Descriptors(c)
    }
}
