//! Parsing options and the document entry points

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::collection::{AnyCollection, Collection};
use crate::consensus::RouterStatusEntry;
use crate::descriptor::Descriptor;
use crate::error::DocumentParseError;
use crate::record::{parse_collection, ParseRecord};
use crate::sniff::{sniff, DocumentKind};

/// Bytes looked at to determine the kind of a document, by default
pub const DEFAULT_SNIFF_LIMIT: usize = 64 * 1024;

/// What to do with a record lacking mandatory information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncompletePolicy {
    /// Fail the whole parse, so that no undercounted collection is returned
    #[default]
    Abort,
    /// Drop the record and log a warning
    Skip,
}

/// Options for parsing documents.
///
/// The free functions of the crate root use the defaults.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub incomplete_records: IncompletePolicy,
    /// Maximum number of bytes inspected when determining the document kind
    pub sniff_limit: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            incomplete_records: IncompletePolicy::Abort,
            sniff_limit: DEFAULT_SNIFF_LIMIT,
        }
    }
}

impl ParseOptions {
    /// Parse a consensus document.
    pub fn parse_consensus(
        &self,
        bytes: impl AsRef<[u8]>,
    ) -> Result<Collection<RouterStatusEntry>, DocumentParseError> {
        self.parse_kind(bytes.as_ref())
    }

    /// Parse a file of one or more server descriptors.
    pub fn parse_descriptors(
        &self,
        bytes: impl AsRef<[u8]>,
    ) -> Result<Collection<Descriptor>, DocumentParseError> {
        self.parse_kind(bytes.as_ref())
    }

    /// Parse a document of any supported kind.
    pub fn parse_unknown(
        &self,
        bytes: impl AsRef<[u8]>,
    ) -> Result<AnyCollection, DocumentParseError> {
        let bytes = bytes.as_ref();
        let kind = self.sniff(bytes)?;
        self.parse_sniffed(kind, bytes)
    }

    /// Read and parse a file containing a document of any supported kind.
    ///
    /// Only regular files are read, and only their first
    /// [`sniff_limit`](ParseOptions::sniff_limit) bytes until they are known
    /// to contain a document. Devices, pipes and other non-documents yield
    /// [`DocumentParseError::UnknownDocumentKind`].
    pub fn parse_unknown_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<AnyCollection, DocumentParseError> {
        let path = path.as_ref();
        if !fs::metadata(path)?.is_file() {
            debug!(path = %path.display(), "not a regular file");
            return Err(DocumentParseError::UnknownDocumentKind);
        }

        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.by_ref()
            .take(self.sniff_limit as u64)
            .read_to_end(&mut bytes)?;
        let kind = sniff(&bytes)?;
        debug!(path = %path.display(), %kind, "reading document");

        file.read_to_end(&mut bytes)?;
        self.parse_sniffed(kind, &bytes)
    }

    fn sniff(&self, bytes: &[u8]) -> Result<DocumentKind, DocumentParseError> {
        sniff(&bytes[..bytes.len().min(self.sniff_limit)])
    }

    fn parse_sniffed(
        &self,
        kind: DocumentKind,
        bytes: &[u8],
    ) -> Result<AnyCollection, DocumentParseError> {
        let text = String::from_utf8_lossy(bytes);
        match kind {
            DocumentKind::Consensus => {
                parse_collection::<RouterStatusEntry>(&text, self).map(AnyCollection::from)
            }
            DocumentKind::ServerDescriptor => {
                parse_collection::<Descriptor>(&text, self).map(AnyCollection::from)
            }
        }
    }

    fn parse_kind<R: ParseRecord>(
        &self,
        bytes: &[u8],
    ) -> Result<Collection<R>, DocumentParseError> {
        let found = self.sniff(bytes)?;
        if found != R::KIND {
            return Err(DocumentParseError::UnexpectedDocumentKind {
                expected: R::KIND,
                found,
            });
        }
        parse_collection(&String::from_utf8_lossy(bytes), self)
    }
}
