//! Tor server descriptor documents

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::collection::Collection;
use crate::consensus::{parse_datetime, parse_protocols, Protocol, SupportedProtocolVersion};
use crate::error::{DocumentParseError, ErrorContext};
use crate::fingerprint::{Fingerprint, FINGERPRINT_LEN};
use crate::meta::Item;
use crate::policy::{CondensedExitPolicy, ExitPolicy, ExitPolicyRule, ExitPolicyType};
use crate::record::{ItemRole, ParseRecord, Record, RecordSpan};
use crate::sniff::DocumentKind;

//
// External dependencies
//
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use sha1::{Digest, Sha1};

/// A set of parsed server descriptors keyed by fingerprint
pub type DescriptorSet = Collection<Descriptor>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyMember {
    Fingerprint(Fingerprint),
    Nickname(String),
}

impl FromStr for FamilyMember {
    type Err = DocumentParseError;

    /// Parse `nickname`, `$FINGERPRINT` or `$FINGERPRINT=nickname`/`~nickname`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('$') {
            Some(hex) => {
                let hex = hex.split(|c| c == '=' || c == '~').next().unwrap_or(hex);
                Ok(FamilyMember::Fingerprint(Fingerprint::from_str_hex(hex)?))
            }
            None => Ok(FamilyMember::Nickname(s.to_string())),
        }
    }
}

/// A relay server descriptor.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(private)]
pub struct Descriptor {
    pub nickname: String,
    pub fingerprint: Fingerprint,
    /// SHA-1 over the text from `router` through `router-signature`
    pub digest: Fingerprint,
    pub published: DateTime<Utc>,
    pub address: Ipv4Addr,
    pub or_port: u16,
    pub dir_port: Option<u16>,
    /// Further OR addresses from `or-address` lines
    #[builder(default, setter(custom))]
    pub or_addresses: Vec<SocketAddr>,
    #[builder(default, setter(strip_option))]
    pub platform: Option<String>,
    #[builder(default)]
    pub protocols: BTreeMap<Protocol, SupportedProtocolVersion>,
    #[builder(default, setter(custom))]
    pub family_members: Vec<FamilyMember>,
    pub bandwidth_avg: u64,
    pub bandwidth_burst: u64,
    pub bandwidth_observed: u64,
    #[builder(default, setter(strip_option))]
    pub uptime: Option<u64>,
    #[builder(default, setter(strip_option))]
    pub contact: Option<String>,
    #[builder(default)]
    pub hibernating: bool,
    #[builder(default, setter(custom))]
    pub exit_policy: ExitPolicy,
    #[builder(default)]
    pub ipv6_policy: CondensedExitPolicy,
    pub raw: String,
}

impl DescriptorBuilder {
    fn add_or_address(&mut self, or: SocketAddr) {
        self.or_addresses.get_or_insert_with(Vec::new).push(or);
    }

    fn add_family_member(&mut self, member: FamilyMember) {
        self.family_members.get_or_insert_with(Vec::new).push(member);
    }

    fn add_exit_policy_rule(&mut self, rule: ExitPolicyRule) {
        self.exit_policy
            .get_or_insert_with(ExitPolicy::default)
            .push(rule);
    }

    /// router nickname address ORPort SOCKSPort DirPort
    fn parse_router(&mut self, item: &Item<'_>) -> Result<(), DocumentParseError> {
        let splits = item.split_arguments()?;
        match splits[..] {
            [nickname, ip, or_port, _socks_port, dir_port, ..] => {
                self.nickname(nickname.to_string());
                let ip = Ipv4Addr::from_str(ip)
                    .map_err(|_| DocumentParseError::InvalidIpAddress(ip.to_string()))?;
                self.address(ip);
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

    /// bandwidth bandwidth-avg bandwidth-burst bandwidth-observed
    fn parse_bandwidth(&mut self, item: &Item<'_>) -> Result<(), DocumentParseError> {
        let splits = item.split_arguments()?;
        match splits[..] {
            [avg, burst, observed, ..] => {
                self.bandwidth_avg(u64::from_str(avg).context("bandwidth-avg")?);
                self.bandwidth_burst(u64::from_str(burst).context("bandwidth-burst")?);
                self.bandwidth_observed(u64::from_str(observed).context("bandwidth-observed")?);
                Ok(())
            }
            _ => Err(DocumentParseError::args_missing(item.keyword)),
        }
    }
}

impl Record for Descriptor {
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

impl ParseRecord for Descriptor {
    const KIND: DocumentKind = DocumentKind::ServerDescriptor;

    fn role(keyword: &str) -> ItemRole {
        match keyword {
            "router" => ItemRole::Opens,
            "router-signature" => ItemRole::Closes,
            kw if kw.starts_with('@') => ItemRole::Ends,
            _ => ItemRole::Field,
        }
    }

    fn from_span(span: &RecordSpan<'_>) -> Result<Self, DocumentParseError> {
        let mut builder = DescriptorBuilder::default();
        builder.raw(span.raw().to_string());
        let mut signing_key = None;

        for item in span.items() {
            match item.keyword {
                "router" => {
                    builder.parse_router(item)?;
                }
                "fingerprint" => {
                    builder.fingerprint(Fingerprint::from_str_hex(item.get_argument()?)?);
                }
                "signing-key" => {
                    signing_key = item.object;
                }
                "published" => {
                    builder.published(parse_datetime(item.get_argument()?)?);
                }
                "bandwidth" => {
                    builder.parse_bandwidth(item)?;
                }
                "or-address" => {
                    let arg = item.get_argument()?;
                    let address = SocketAddr::from_str(arg)
                        .map_err(|_| DocumentParseError::InvalidIpAddress(arg.to_string()))?;
                    builder.add_or_address(address);
                }
                "platform" => {
                    builder.platform(item.get_argument()?.to_string());
                }
                "proto" => {
                    builder.protocols(parse_protocols(item)?);
                }
                "family" => {
                    for member in item.args() {
                        builder.add_family_member(member.parse()?);
                    }
                }
                "uptime" => {
                    builder.uptime(u64::from_str(item.get_argument()?).context("uptime")?);
                }
                "contact" => {
                    builder.contact(item.arguments.unwrap_or("").to_string());
                }
                "hibernating" => {
                    builder.hibernating(item.arguments == Some("1"));
                }
                "accept" => {
                    builder.add_exit_policy_rule(ExitPolicyRule::parse(
                        ExitPolicyType::Accept,
                        item.get_argument()?,
                    )?);
                }
                "reject" => {
                    builder.add_exit_policy_rule(ExitPolicyRule::parse(
                        ExitPolicyType::Reject,
                        item.get_argument()?,
                    )?);
                }
                "ipv6-policy" => {
                    builder.ipv6_policy(item.get_argument()?.parse::<CondensedExitPolicy>()?);
                }
                "router-signature" => {
                    builder.digest(digest_from_raw(span.raw_through_keyword(item)));
                }
                _ => {}
            }
        }

        // without a fingerprint line, the fingerprint is the digest of the identity key
        if builder.fingerprint.is_none() {
            if let Some(key) = signing_key {
                builder.fingerprint(digest_from_raw(key.decode()?));
            }
        }

        builder
            .build()
            .map_err(|e| DocumentParseError::incomplete(Self::KIND, span.line(), e))
    }
}

/// Compute a descriptor's digest given the extracted raw content
pub fn digest_from_raw<R: AsRef<[u8]>>(raw: R) -> Fingerprint {
    let mut hasher = Sha1::new();
    hasher.update(raw.as_ref());
    let result = hasher.finalize();
    let mut digest = [0u8; FINGERPRINT_LEN];
    digest.copy_from_slice(&result);
    Fingerprint::from(digest)
}
