//! A parser for Tor docs.
//!
//! This crate implements parsing of Tor documents as specified in
//! [dir-spec](https://gitlab.torproject.org/tpo/core/torspec/-/blob/main/dir-spec.txt).
//! It parses consensus documents (`@type network-status-consensus-3`)
//! and full relay descriptors (`@type server-descriptor`) into
//! [`Collection`]s: records of one kind, indexed by relay [`Fingerprint`].
//!
//! ```no_run
//! # fn main() -> Result<(), tordir::DocumentParseError> {
//! use tordir::Record;
//!
//! let consensus = tordir::parse_unknown_file("2015-08-01-00-00-00-consensus")?;
//! let fingerprint = "9695DFC35FFEB861329B9F1AB04C46397020CE31".parse()?;
//! if let Some(relay) = consensus.get(&fingerprint) {
//!     println!("{} is in the consensus", relay.nickname());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Signatures are not verified.

use std::path::Path;

pub mod collection;
#[doc(inline)]
pub use collection::{AnyCollection, Collection, DocumentInfo};

pub mod consensus;
#[doc(inline)]
pub use consensus::{Consensus, RouterStatusEntry};

pub mod descriptor;
#[doc(inline)]
pub use descriptor::{Descriptor, DescriptorSet};

pub mod error;
pub use error::{DocumentParseError, MergeError};

pub mod fingerprint;
pub use fingerprint::Fingerprint;

pub mod meta;

pub mod options;
pub use options::{IncompletePolicy, ParseOptions};

pub mod policy;

pub mod record;
pub use record::Record;

pub mod sniff;
pub use sniff::{sniff, DocumentKind};

/// Parse a consensus document.
pub fn parse_consensus(bytes: impl AsRef<[u8]>) -> Result<Consensus, DocumentParseError> {
    ParseOptions::default().parse_consensus(bytes)
}

/// Parse a file of one or more server descriptors.
pub fn parse_descriptors(bytes: impl AsRef<[u8]>) -> Result<DescriptorSet, DocumentParseError> {
    ParseOptions::default().parse_descriptors(bytes)
}

/// Parse a document whose kind is determined from its content.
pub fn parse_unknown(bytes: impl AsRef<[u8]>) -> Result<AnyCollection, DocumentParseError> {
    ParseOptions::default().parse_unknown(bytes)
}

/// Read and parse a document file whose kind is determined from its content.
pub fn parse_unknown_file(path: impl AsRef<Path>) -> Result<AnyCollection, DocumentParseError> {
    ParseOptions::default().parse_unknown_file(path)
}
