//! Custom error types for the parsing of Tor documents

use std::num::ParseIntError;
use std::string::ToString;

use thiserror;

use crate::sniff::DocumentKind;

/// Error that occured when parsing a Tor document
#[derive(thiserror::Error, Debug)]
pub enum DocumentParseError {
    #[error("Malformed object block at line {line}: {reason}")]
    MalformedBlock { line: usize, reason: String },
    #[error("Line {line} is not a valid item: '{raw}'")]
    MalformedItem { line: usize, raw: String },
    #[error("Invalid fingerprint '{raw}'")]
    InvalidFingerprint { raw: String },
    #[error("The {kind} record starting at line {line} lacks mandatory information")]
    IncompleteRecord {
        kind: DocumentKind,
        line: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Input is not a supported Tor document")]
    UnknownDocumentKind,
    #[error("Expected a {expected} document, found a {found} document")]
    UnexpectedDocumentKind {
        expected: DocumentKind,
        found: DocumentKind,
    },
    #[error("Could not read document")]
    Io(#[from] std::io::Error),
    #[error("An item with keyword '{keyword}' unexpectedly had no or not enough arguments")]
    ItemArgumentsMissing { keyword: String },
    #[error("An item with keyword '{keyword}' was not expected at this position")]
    UnexpectedKeyword { keyword: String },
    #[error("Could not decode string as base64")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Could not parse date/time")]
    InvalidDate(#[from] chrono::format::ParseError),
    #[error("Could not parse integer in {context}")]
    InvalidInt { context: String },
    #[error("Invalid protocol version '{raw}'")]
    InvalidProtocolVersion { raw: String },
    #[error("Invalid exit policy entry '{raw}'")]
    InvalidExitPolicyEntry { raw: String },
    #[error("Malformed exit policy '{raw}'")]
    MalformedExitPolicy { raw: String },
    #[error("Invalid argument dictionary")]
    InvalidArgumentDict,
    #[error("Invalid bandwidth weight entry")]
    InvalidBandwidthWeight,
    #[error("Invalid IP address of relay: {0}")]
    InvalidIpAddress(String),
}

impl DocumentParseError {
    /// Create a new ItemArgumentsMissing error, easily
    pub fn args_missing(keyword: impl Into<String>) -> DocumentParseError {
        DocumentParseError::ItemArgumentsMissing {
            keyword: keyword.into(),
        }
    }

    pub(crate) fn invalid_fingerprint(raw: impl Into<String>) -> DocumentParseError {
        DocumentParseError::InvalidFingerprint { raw: raw.into() }
    }

    pub(crate) fn malformed_block(line: usize, reason: impl Into<String>) -> DocumentParseError {
        DocumentParseError::MalformedBlock {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn incomplete(
        kind: DocumentKind,
        line: usize,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> DocumentParseError {
        DocumentParseError::IncompleteRecord {
            kind,
            line,
            source: Box::new(source),
        }
    }

    /// Whether this error means the input was not recognized as a document
    /// at all, as opposed to a recognized document that failed to parse.
    pub fn is_unknown_document(&self) -> bool {
        matches!(self, DocumentParseError::UnknownDocumentKind)
    }
}

/// Error when merging two collections
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    #[error("Cannot merge a {found} collection into a {expected} collection")]
    KindMismatch {
        expected: DocumentKind,
        found: DocumentKind,
    },
}

pub(crate) trait ErrorContext<T> {
    type IntoError;

    fn context(self, context: impl ToString) -> Result<T, Self::IntoError>;
}

impl<T> ErrorContext<T> for Result<T, ParseIntError> {
    type IntoError = DocumentParseError;

    fn context(self, context: impl ToString) -> Result<T, Self::IntoError> {
        self.map_err(|_| DocumentParseError::InvalidInt {
            context: context.to_string(),
        })
    }
}
