//! Detection of the kind of a Tor document from its first lines

use memchr::memchr;
use phf::phf_map;
use strum::IntoStaticStr;
use tracing::trace;

use crate::error::DocumentParseError;
use crate::meta::Scanner;

/// The kinds of documents this crate can parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, strum::Display)]
pub enum DocumentKind {
    /// A network status consensus (`@type network-status-consensus-3`)
    #[strum(serialize = "network-status-consensus-3")]
    Consensus,
    /// One or more relay server descriptors (`@type server-descriptor`)
    #[strum(serialize = "server-descriptor")]
    ServerDescriptor,
}

/// `@type` annotation names as used by CollecTor archives
static ANNOTATED_TYPES: phf::Map<&'static str, DocumentKind> = phf_map! {
    "network-status-consensus-3" => DocumentKind::Consensus,
    "server-descriptor" => DocumentKind::ServerDescriptor,
};

/// The first keyword of a document without annotations
static FIRST_KEYWORDS: phf::Map<&'static str, DocumentKind> = phf_map! {
    "network-status-version" => DocumentKind::Consensus,
    "router" => DocumentKind::ServerDescriptor,
};

/// Determine the kind of document from its first bytes.
///
/// The prefix may be cut anywhere, including in the middle of a line or of a
/// multi-byte character. Only the lines deciding the kind (annotations and
/// the first item) must be valid UTF-8; later lines are not looked at.
/// Anything containing NUL bytes, or whose first item matches no known
/// document, yields [`DocumentParseError::UnknownDocumentKind`].
pub fn sniff(prefix: &[u8]) -> Result<DocumentKind, DocumentParseError> {
    if memchr(0, prefix).is_some() {
        return Err(DocumentParseError::UnknownDocumentKind);
    }
    // a character cut off at the end of the prefix is dropped
    let prefix = match std::str::from_utf8(prefix) {
        Err(e) if e.error_len().is_none() => &prefix[..e.valid_up_to()],
        _ => prefix,
    };
    let text = String::from_utf8_lossy(prefix);

    for item in Scanner::new(&text) {
        // the prefix may end inside an object, so errors only count as "unknown"
        let item = item.map_err(|_| DocumentParseError::UnknownDocumentKind)?;
        if text[item.span.start..item.header_end].contains(char::REPLACEMENT_CHARACTER) {
            return Err(DocumentParseError::UnknownDocumentKind);
        }
        if item.keyword == "@type" {
            let kind = item
                .args()
                .next()
                .and_then(|name| ANNOTATED_TYPES.get(name))
                .copied()
                .ok_or(DocumentParseError::UnknownDocumentKind)?;
            trace!(%kind, "document kind from @type annotation");
            return Ok(kind);
        }
        if item.is_annotation() {
            continue;
        }

        let kind = FIRST_KEYWORDS
            .get(item.keyword)
            .copied()
            .ok_or(DocumentParseError::UnknownDocumentKind)?;
        // microdescriptor consensuses use a different router line layout
        if kind == DocumentKind::Consensus && item.args().collect::<Vec<_>>() != ["3"] {
            return Err(DocumentParseError::UnknownDocumentKind);
        }
        trace!(%kind, keyword = item.keyword, "document kind from first keyword");
        return Ok(kind);
    }

    Err(DocumentParseError::UnknownDocumentKind)
}
