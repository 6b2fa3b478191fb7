//! Tor consensus documents

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::collection::{Collection, DocumentInfo};
use crate::error::{DocumentParseError, ErrorContext};
use crate::fingerprint::Fingerprint;
use crate::meta::Item;
use crate::policy::CondensedExitPolicy;
use crate::record::{ItemRole, ParseRecord, Record, RecordSpan};
use crate::sniff::DocumentKind;

//
// External dependencies
//
use chrono::{offset::TimeZone, DateTime, NaiveDateTime, Utc};
use derive_builder::Builder;
use strum::{EnumString, IntoStaticStr};

/// A parsed consensus document: its router status entries keyed by fingerprint
pub type Consensus = Collection<RouterStatusEntry>;

/// A relay flag in the consensus
#[derive(
    Debug, Clone, EnumString, IntoStaticStr, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Flag {
    Authority,
    BadExit,
    Exit,
    Fast,
    Guard,
    HSDir,
    MiddleOnly,
    Named,
    Unnamed,
    NoEdConsensus,
    Running,
    Stable,
    StaleDesc,
    Sybil,
    V2Dir,
    Valid,
    /// A flag introduced after this crate was written
    #[strum(default)]
    Other(String),
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Flag::Other(name) => f.write_str(name),
            known => f.write_str(known.into()),
        }
    }
}

/// A Tor sub-protocol
#[derive(Debug, Clone, EnumString, IntoStaticStr, PartialEq, PartialOrd, Eq, Ord)]
pub enum Protocol {
    Conflux,
    Cons,
    Desc,
    DirCache,
    FlowCtrl,
    HSDir,
    HSIntro,
    HSRend,
    Link,
    LinkAuth,
    Microdesc,
    Padding,
    Relay,
    #[strum(default)]
    Other(String),
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Other(name) => f.write_str(name),
            known => f.write_str(known.into()),
        }
    }
}

/// A range of supported protocol versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedProtocolVersion {
    versions: Vec<u8>,
}

impl SupportedProtocolVersion {
    pub fn supports(&self, v: u8) -> bool {
        self.versions.binary_search(&v).is_ok()
    }
}

impl fmt::Display for SupportedProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut last_version = None;
        let mut range_end = None;
        for v in self.versions.iter().copied() {
            match last_version {
                Some(last) => {
                    if v == last + 1 {
                        if range_end.is_none() {
                            write!(f, "-")?;
                        }
                        range_end = Some(v);
                    } else {
                        if let Some(x) = range_end.take() {
                            write!(f, "{}", x)?;
                        }
                        write!(f, ",{}", v)?;
                    }
                }
                None => {
                    // first element
                    write!(f, "{}", v)?;
                }
            }
            last_version = Some(v);
        }
        if let Some(x) = range_end.take() {
            write!(f, "{}", x)?;
        }

        Ok(())
    }
}

impl FromStr for SupportedProtocolVersion {
    type Err = DocumentParseError;

    /// Parse from "3", "2-5" or "1-2,5".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut versions = Vec::new();
        for component in s.split(',').filter(|c| !c.is_empty()) {
            match component.split_once('-') {
                Some((min, max)) => {
                    let min = u8::from_str(min).context("protocol version (from)")?;
                    let max = u8::from_str(max).context("protocol version (to)")?;
                    versions.extend(min..=max);
                }
                None => {
                    versions.push(u8::from_str(component).context("protocol version")?);
                }
            }
        }
        versions.sort_unstable();
        versions.dedup();
        Ok(SupportedProtocolVersion { versions })
    }
}

/// Parse the arguments of a `pr` or `proto` item.
pub(crate) fn parse_protocols(
    item: &Item<'_>,
) -> Result<BTreeMap<Protocol, SupportedProtocolVersion>, DocumentParseError> {
    let mut protocols = BTreeMap::new();
    for split in item.args() {
        let (left, right) = split
            .split_once('=')
            .ok_or(DocumentParseError::InvalidArgumentDict)?;
        let prot = left
            .parse::<Protocol>()
            .map_err(|_| DocumentParseError::InvalidArgumentDict)?;
        let vers = right.parse::<SupportedProtocolVersion>().map_err(|_| {
            DocumentParseError::InvalidProtocolVersion {
                raw: right.to_string(),
            }
        })?;
        protocols.insert(prot, vers);
    }
    Ok(protocols)
}

/// Parse a "YYYY-MM-DD HH:MM:SS" timestamp.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DocumentParseError> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// A router status entry of a consensus, containing only these sparse
/// information instead of the full server descriptor
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(private)]
pub struct RouterStatusEntry {
    pub nickname: String,
    pub fingerprint: Fingerprint,
    pub digest: Fingerprint,
    pub published: DateTime<Utc>,
    pub address: Ipv4Addr,
    pub or_port: u16,
    pub dir_port: Option<u16>,
    /// Further OR addresses from `a` lines
    #[builder(default, setter(custom))]
    pub additional_addresses: Vec<SocketAddr>,
    #[builder(default, setter(custom))]
    pub flags: BTreeSet<Flag>,
    #[builder(default, setter(strip_option))]
    pub version_line: Option<String>,
    #[builder(default)]
    pub protocols: BTreeMap<Protocol, SupportedProtocolVersion>,
    #[builder(default)]
    pub exit_policy: CondensedExitPolicy,
    #[builder(default, setter(strip_option))]
    pub bandwidth: Option<u64>,
    #[builder(default)]
    pub measured: bool,
    #[builder(default)]
    pub unmeasured: bool,
    pub raw: String,
}

impl RouterStatusEntryBuilder {
    fn add_address(&mut self, address: SocketAddr) {
        self.additional_addresses
            .get_or_insert_with(Vec::new)
            .push(address);
    }

    fn add_flag(&mut self, flag: Flag) {
        self.flags.get_or_insert_with(BTreeSet::new).insert(flag);
    }

    /// r nickname identity digest publication-date publication-time IP ORPort DirPort
    fn parse_r(&mut self, item: &Item<'_>) -> Result<(), DocumentParseError> {
        let splits = item.split_arguments()?;
        match splits[..] {
            [nickname, identity, digest, published_1, published_2, ip, or_port, dir_port, ..] => {
                self.nickname(nickname.to_string());
                self.fingerprint(Fingerprint::from_str_b64(identity)?);
                self.digest(Fingerprint::from_str_b64(digest)?);
                self.published(parse_datetime(&format!("{published_1} {published_2}"))?);
                let address = Ipv4Addr::from_str(ip)
                    .map_err(|_| DocumentParseError::InvalidIpAddress(ip.to_string()))?;
                self.address(address);
                self.or_port(u16::from_str(or_port).context("OR port")?);
                self.dir_port(match u16::from_str(dir_port).context("dir port")? {
                    0 => None,
                    x => Some(x),
                });
                Ok(())
            }
            _ => Err(DocumentParseError::args_missing(item.keyword)),
        }
    }

    /// w Bandwidth=N [Measured=N] [Unmeasured=1]
    ///
    /// Each `w` line replaces all three bandwidth fields.
    fn parse_w(&mut self, item: &Item<'_>) -> Result<(), DocumentParseError> {
        let mut bandwidth = None;
        let mut measured = false;
        let mut unmeasured = false;
        for arg in item.args() {
            let (k, v) = arg
                .split_once('=')
                .ok_or(DocumentParseError::InvalidBandwidthWeight)?;
            let v = u64::from_str(v).map_err(|_| DocumentParseError::InvalidBandwidthWeight)?;
            match k {
                "Bandwidth" => bandwidth = Some(v),
                "Measured" => measured = v > 0,
                "Unmeasured" => unmeasured = v == 1,
                _ => {}
            }
        }
        self.bandwidth = Some(bandwidth);
        self.measured(measured);
        self.unmeasured(unmeasured);
        Ok(())
    }
}

impl Record for RouterStatusEntry {
    fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn raw(&self) -> &str {
        &self.raw
    }
}

impl ParseRecord for RouterStatusEntry {
    const KIND: DocumentKind = DocumentKind::Consensus;

    fn role(keyword: &str) -> ItemRole {
        match keyword {
            "r" => ItemRole::Opens,
            "directory-footer" | "bandwidth-weights" | "directory-signature" => ItemRole::Ends,
            _ => ItemRole::Field,
        }
    }

    fn from_span(span: &RecordSpan<'_>) -> Result<Self, DocumentParseError> {
        let mut entry = RouterStatusEntryBuilder::default();
        entry.raw(span.raw().to_string());

        for item in span.items() {
            match item.keyword {
                "r" => {
                    // a router line lacking fields means a truncated entry
                    if let Err(e) = entry.parse_r(item) {
                        return Err(match e {
                            DocumentParseError::ItemArgumentsMissing { .. } => {
                                DocumentParseError::incomplete(Self::KIND, item.line, e)
                            }
                            e => e,
                        });
                    }
                }
                "a" => {
                    let arg = item.get_argument()?;
                    let address = SocketAddr::from_str(arg)
                        .map_err(|_| DocumentParseError::InvalidIpAddress(arg.to_string()))?;
                    entry.add_address(address);
                }
                "s" => {
                    for flag in item.args() {
                        // parsing cannot fail thanks to the catch-all variant
                        if let Ok(flag) = flag.parse::<Flag>() {
                            entry.add_flag(flag);
                        }
                    }
                }
                "v" => {
                    entry.version_line(item.arguments.unwrap_or("").to_string());
                }
                "pr" => {
                    entry.protocols(parse_protocols(item)?);
                }
                "p" => {
                    entry.exit_policy(item.get_argument()?.parse::<CondensedExitPolicy>()?);
                }
                "w" => {
                    entry.parse_w(item)?;
                }
                _ => {}
            }
        }

        entry
            .build()
            .map_err(|e| DocumentParseError::incomplete(Self::KIND, span.line(), e))
    }

    fn document_info(items: &[Item<'_>]) -> Result<DocumentInfo, DocumentParseError> {
        let mut info = DocumentInfo::default();
        for item in items {
            match item.keyword {
                "valid-after" => info.valid_after = Some(parse_datetime(item.get_argument()?)?),
                "fresh-until" => info.fresh_until = Some(parse_datetime(item.get_argument()?)?),
                "valid-until" => info.valid_until = Some(parse_datetime(item.get_argument()?)?),
                "known-flags" => info.known_flags = item.args().map(str::to_string).collect(),
                "params" => info.params = parse_int_dict(item, "params")?,
                "bandwidth-weights" => {
                    info.bandwidth_weights = parse_int_dict(item, "bandwidth-weights")?
                }
                _ => {}
            }
        }
        Ok(info)
    }
}

/// Parse `key=value` arguments with integer values.
fn parse_int_dict(
    item: &Item<'_>,
    context: &str,
) -> Result<BTreeMap<String, i64>, DocumentParseError> {
    let mut dict = BTreeMap::new();
    for arg in item.args() {
        let (k, v) = arg
            .split_once('=')
            .ok_or(DocumentParseError::InvalidArgumentDict)?;
        dict.insert(k.to_string(), i64::from_str(v).context(context)?);
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordParser;

    const HEADER: &str = "network-status-version 3\n\
        vote-status consensus\n\
        valid-after 2015-08-01 00:00:00\n\
        fresh-until 2015-08-01 01:00:00\n\
        valid-until 2015-08-01 03:00:00\n\
        known-flags Authority BadExit Exit Fast Guard HSDir Running Stable V2Dir Valid\n\
        params CircuitPriorityHalflifeMsec=30000 bwauthpid=1\n\
        dir-source moria1 D586D18309DED4CD6D57C18FDB97EFA96D330566 128.31.0.34 128.31.0.34 9131 9101\n\
        contact 1024D/28988BF5 arma mit edu\n";

    const ENTRY: &str = "r test000a lpXfw1/+uGEym58asExGOXAgzjE AAAAAAAAAAAAAAAAAAAAAAAAAAA 2015-07-31 23:12:42 198.51.100.7 9001 9030\n\
        a [2001:db8::7]:9001\n\
        s Fast Running\n\
        s Stable Valid ShinyNewFlag\n\
        v Tor 0.2.6.9\n\
        v Tor 0.2.6.10\n\
        pr Cons=1-2 Link=1-4 Relay=1-2 FutureProto=3\n\
        w Bandwidth=1200 Measured=1100\n\
        p accept 80,443\n\
        zz something unknown\n";

    const FOOTER: &str = "directory-footer\n\
        bandwidth-weights Wbd=0 Wbe=0 Wbg=4203\n\
        directory-signature D586D18309DED4CD6D57C18FDB97EFA96D330566 4A7CF1F3B2D44CDB3C4D3E8CB1A0F4A9B6F5E7D1\n\
        -----BEGIN SIGNATURE-----\n\
        AAAA\n\
        -----END SIGNATURE-----\n";

    fn entries(text: &str) -> Result<Vec<RouterStatusEntry>, DocumentParseError> {
        RecordParser::<RouterStatusEntry>::new(text).collect()
    }

    #[test]
    fn parses_entry_fields() {
        let text = format!("{HEADER}{ENTRY}{FOOTER}");
        let parsed = entries(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        let entry = &parsed[0];

        assert_eq!(entry.nickname, "test000a");
        assert_eq!(
            entry.fingerprint.to_string(),
            "9695DFC35FFEB861329B9F1AB04C46397020CE31"
        );
        assert_eq!(entry.address, Ipv4Addr::new(198, 51, 100, 7));
        assert_eq!(entry.or_port, 9001);
        assert_eq!(entry.dir_port, Some(9030));
        assert_eq!(entry.additional_addresses.len(), 1);
        assert_eq!(entry.bandwidth, Some(1200));
        assert!(entry.measured);
        assert!(!entry.unmeasured);
        assert!(entry.exit_policy.allows_port(443));
        assert!(entry.protocols[&Protocol::Link].supports(3));
        assert!(entry
            .protocols
            .contains_key(&Protocol::Other("FutureProto".to_string())));
        assert_eq!(entry.published.to_string(), "2015-07-31 23:12:42 UTC");
    }

    #[test]
    fn repeated_keywords() {
        let text = format!("{HEADER}{ENTRY}{FOOTER}");
        let entry = entries(&text).unwrap().remove(0);
        // flags accumulate, single-valued fields keep the last value
        assert!(entry.flags.contains(&Flag::Fast));
        assert!(entry.flags.contains(&Flag::Valid));
        assert!(entry.flags.contains(&Flag::Other("ShinyNewFlag".to_string())));
        assert_eq!(entry.flags.len(), 5);
        assert_eq!(entry.version_line.as_deref(), Some("Tor 0.2.6.10"));
    }

    #[test]
    fn later_w_line_replaces_all_bandwidth_fields() {
        let entry_lines = ENTRY.replace(
            "w Bandwidth=",
            "w Bandwidth=10 Measured=9 Unmeasured=1\nw Bandwidth=",
        );
        let text = format!("{HEADER}{entry_lines}{FOOTER}");
        let first = entries(&text).unwrap().remove(0);
        assert_eq!(first.bandwidth, Some(1200));
        assert!(first.measured);
        assert!(!first.unmeasured);

        let text = format!("{HEADER}{ENTRY}w Bandwidth=20\n{FOOTER}");
        let entry = entries(&text).unwrap().remove(0);
        assert_eq!(entry.bandwidth, Some(20));
        assert!(!entry.measured);
        assert!(!entry.unmeasured);

        let text = format!("{HEADER}{ENTRY}w Bandwidth=20 Measured=0\n{FOOTER}");
        let entry = entries(&text).unwrap().remove(0);
        assert!(!entry.measured);
    }

    #[test]
    fn raw_span_keeps_unknown_items_and_excludes_footer() {
        let text = format!("{HEADER}{ENTRY}{FOOTER}");
        let entry = entries(&text).unwrap().remove(0);
        assert_eq!(entry.raw, ENTRY);
        assert!(entry.raw.contains("zz something unknown"));
    }

    #[test]
    fn truncated_router_line_is_incomplete() {
        let text = format!("{HEADER}{ENTRY}r cut lpXfw1/+uGEym58asExGOXAgzjE\n");
        let result = entries(&text);
        assert!(matches!(
            result,
            Err(DocumentParseError::IncompleteRecord {
                kind: DocumentKind::Consensus,
                line: 20,
                ..
            })
        ));
    }

    #[test]
    fn invalid_identity_is_rejected() {
        let text = ENTRY.replace("lpXfw1/+uGEym58asExGOXAgzjE", "lpXfw1/+uGEym58asExG");
        assert!(matches!(
            entries(&text),
            Err(DocumentParseError::InvalidFingerprint { .. })
        ));
    }

    #[test]
    fn reads_document_info() {
        let text = format!("{HEADER}{ENTRY}{FOOTER}");
        let mut parser = RecordParser::<RouterStatusEntry>::new(&text);
        assert_eq!(parser.by_ref().count(), 1);
        let info = RouterStatusEntry::document_info(parser.outside_items()).unwrap();
        assert_eq!(
            info.valid_after.unwrap().to_string(),
            "2015-08-01 00:00:00 UTC"
        );
        assert_eq!(info.known_flags.len(), 10);
        assert_eq!(info.params["bwauthpid"], 1);
        assert_eq!(info.bandwidth_weights["Wbg"], 4203);
    }

    #[test]
    fn protocol_versions_display() {
        let v: SupportedProtocolVersion = "1-3,5,7-8".parse().unwrap();
        assert_eq!(v.to_string(), "1-3,5,7-8");
        assert!(v.supports(2) && !v.supports(4));
        assert!("1-x".parse::<SupportedProtocolVersion>().is_err());
    }
}
