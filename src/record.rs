//! Grouping the items of a document into per-router records.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::collection::{Collection, DocumentInfo};
use crate::error::DocumentParseError;
use crate::fingerprint::Fingerprint;
use crate::meta::{Item, Scanner};
use crate::options::{IncompletePolicy, ParseOptions};
use crate::sniff::DocumentKind;

/// What every parsed record provides, whatever its kind.
pub trait Record: fmt::Debug {
    fn fingerprint(&self) -> &Fingerprint;
    fn nickname(&self) -> &str;
    /// The exact text this record was parsed from
    fn raw(&self) -> &str;
}

/// How an item relates to the record boundaries of a document kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    /// Starts a new record, finishing the current one
    Opens,
    /// Last item of the current record
    Closes,
    /// Finishes the current record without belonging to it
    Ends,
    /// Belongs to the current record, if any
    Field,
}

/// A record kind that can be parsed from a document
pub trait ParseRecord: Record + Sized {
    const KIND: DocumentKind;

    fn role(keyword: &str) -> ItemRole;

    fn from_span(span: &RecordSpan<'_>) -> Result<Self, DocumentParseError>;

    /// Read document-level information from the items outside of any record.
    fn document_info(_items: &[Item<'_>]) -> Result<DocumentInfo, DocumentParseError> {
        Ok(DocumentInfo::default())
    }
}

/// The consecutive items making up one record
#[derive(Debug)]
pub struct RecordSpan<'a> {
    text: &'a str,
    items: Vec<Item<'a>>,
}

impl<'a> RecordSpan<'a> {
    pub fn items(&self) -> &[Item<'a>] {
        &self.items
    }

    fn start(&self) -> usize {
        self.items.first().map_or(0, |i| i.span.start)
    }

    /// Line of the item that opened the record
    pub fn line(&self) -> usize {
        self.items.first().map_or(0, |i| i.line)
    }

    /// The full text of the record.
    pub fn raw(&self) -> &'a str {
        let end = self.items.last().map_or(0, |i| i.span.end);
        &self.text[self.start()..end]
    }

    /// The text from the start of the record up to and including the
    /// keyword line of `item`, which must belong to this record.
    pub fn raw_through_keyword(&self, item: &Item<'a>) -> &'a str {
        &self.text[self.start()..item.header_end]
    }
}

enum State<'a> {
    AwaitingBoundary,
    InRecord(Vec<Item<'a>>),
    Done,
}

/// Lazy iterator over the records of a document.
///
/// Only the items of the record currently being assembled are kept, along
/// with the items outside of records (header and footer).
pub struct RecordParser<'a, R> {
    scanner: Scanner<'a>,
    state: State<'a>,
    outside: Vec<Item<'a>>,
    _record: PhantomData<R>,
}

impl<'a, R: ParseRecord> RecordParser<'a, R> {
    pub fn new(text: &'a str) -> RecordParser<'a, R> {
        RecordParser {
            scanner: Scanner::new(text),
            state: State::AwaitingBoundary,
            outside: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Items seen so far that belong to no record.
    pub fn outside_items(&self) -> &[Item<'a>] {
        &self.outside
    }

    fn finish(&self, items: Vec<Item<'a>>) -> Result<R, DocumentParseError> {
        R::from_span(&RecordSpan {
            text: self.scanner.text(),
            items,
        })
    }
}

impl<'a, R: ParseRecord> Iterator for RecordParser<'a, R> {
    type Item = Result<R, DocumentParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let State::Done = self.state {
                return None;
            }
            let item = match self.scanner.next() {
                Some(Ok(item)) => item,
                Some(Err(e)) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
                None => {
                    return match std::mem::replace(&mut self.state, State::Done) {
                        State::InRecord(items) => Some(self.finish(items)),
                        _ => None,
                    };
                }
            };

            let state = std::mem::replace(&mut self.state, State::AwaitingBoundary);
            match (state, R::role(item.keyword)) {
                (State::InRecord(items), ItemRole::Opens) => {
                    self.state = State::InRecord(vec![item]);
                    return Some(self.finish(items));
                }
                (State::InRecord(mut items), ItemRole::Closes) => {
                    items.push(item);
                    return Some(self.finish(items));
                }
                (State::InRecord(items), ItemRole::Ends) => {
                    self.outside.push(item);
                    return Some(self.finish(items));
                }
                (State::InRecord(mut items), ItemRole::Field) => {
                    items.push(item);
                    self.state = State::InRecord(items);
                }
                (_, ItemRole::Opens) => {
                    self.state = State::InRecord(vec![item]);
                }
                (_, ItemRole::Closes) => {
                    self.state = State::Done;
                    return Some(Err(DocumentParseError::UnexpectedKeyword {
                        keyword: item.keyword.to_string(),
                    }));
                }
                (_, ItemRole::Ends) | (_, ItemRole::Field) => {
                    self.outside.push(item);
                }
            }
        }
    }
}

/// Parse a whole document of a known kind into a collection.
pub(crate) fn parse_collection<R: ParseRecord>(
    text: &str,
    options: &ParseOptions,
) -> Result<Collection<R>, DocumentParseError> {
    let mut parser = RecordParser::<R>::new(text);
    let mut collection = Collection::new();
    let mut parsed = 0usize;
    let mut skipped = 0usize;

    for record in parser.by_ref() {
        match record {
            Ok(record) => {
                parsed += 1;
                if let Some(old) = collection.insert(record) {
                    debug!(
                        fingerprint = %old.fingerprint(),
                        "duplicate fingerprint, keeping the later record"
                    );
                }
            }
            Err(DocumentParseError::IncompleteRecord { kind, line, source })
                if options.incomplete_records == IncompletePolicy::Skip =>
            {
                warn!(%kind, line, error = %source, "skipping incomplete record");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    collection.set_info(R::document_info(parser.outside_items())?);

    debug!(
        kind = %R::KIND,
        records = collection.len(),
        duplicates = parsed - collection.len(),
        skipped,
        "parsed document"
    );
    Ok(collection)
}
