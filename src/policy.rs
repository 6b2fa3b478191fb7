//! Exit policies, in their full (descriptor) and condensed (consensus) forms

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::IpNet;

use crate::error::{DocumentParseError, ErrorContext};

/// Exit policy type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicyType {
    Accept,
    Reject,
}

impl ExitPolicyType {
    fn as_str(&self) -> &'static str {
        match self {
            ExitPolicyType::Accept => "accept",
            ExitPolicyType::Reject => "reject",
        }
    }
}

impl FromStr for ExitPolicyType {
    type Err = DocumentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(ExitPolicyType::Accept),
            "reject" => Ok(ExitPolicyType::Reject),
            _ => Err(DocumentParseError::MalformedExitPolicy { raw: s.to_string() }),
        }
    }
}

impl fmt::Display for ExitPolicyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single port or an inclusive range of ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRange {
    Single(u16),
    Range { min: u16, max: u16 },
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        match *self {
            PortRange::Single(x) => x == port,
            PortRange::Range { min, max } => min <= port && port <= max,
        }
    }
}

impl FromStr for PortRange {
    type Err = DocumentParseError;

    /// Parse from "3" or "2-5".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.split_once('-') {
            Some((min, max)) => u16::from_str(min)
                .and_then(|min| Ok(PortRange::Range { min, max: max.parse()? })),
            None => u16::from_str(s).map(PortRange::Single),
        };
        parsed.map_err(|_| DocumentParseError::InvalidExitPolicyEntry { raw: s.to_string() })
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortRange::Single(x) => write!(f, "{}", x),
            PortRange::Range { min, max } => write!(f, "{}-{}", min, max),
        }
    }
}

/// A port-only exit policy summary, as found in consensus `p` lines
/// and descriptor `ipv6-policy` lines, e.g. `accept 80,443,6660-6669`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondensedExitPolicy {
    pub policy_type: ExitPolicyType,
    pub entries: Vec<PortRange>,
}

impl CondensedExitPolicy {
    pub fn allows_port(&self, port: u16) -> bool {
        let listed = self.entries.iter().any(|entry| entry.contains(port));
        match self.policy_type {
            ExitPolicyType::Accept => listed,
            ExitPolicyType::Reject => !listed,
        }
    }
}

impl Default for CondensedExitPolicy {
    /// A missing summary is equivalent to "reject 1-65535".
    fn default() -> Self {
        CondensedExitPolicy {
            policy_type: ExitPolicyType::Reject,
            entries: vec![PortRange::Range { min: 1, max: 65535 }],
        }
    }
}

impl FromStr for CondensedExitPolicy {
    type Err = DocumentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cmd, ports) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| DocumentParseError::MalformedExitPolicy { raw: s.to_string() })?;
        let policy_type = cmd.parse::<ExitPolicyType>()?;
        let entries = ports
            .trim()
            .split(',')
            .map(|x| x.parse::<PortRange>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CondensedExitPolicy {
            policy_type,
            entries,
        })
    }
}

impl fmt::Display for CondensedExitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ", self.policy_type)?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// The address part of an exit policy rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressPattern {
    Wildcard,
    Network(IpNet),
}

impl AddressPattern {
    pub fn matches(&self, ip: IpAddr) -> bool {
        match self {
            AddressPattern::Wildcard => true,
            AddressPattern::Network(net) => net.contains(&ip),
        }
    }
}

impl FromStr for AddressPattern {
    type Err = DocumentParseError;

    /// Parse `*`, `1.2.3.4`, `1.2.3.0/24`, `1.2.3.0/255.255.255.0`,
    /// `[2001:db8::1]` or `[2001:db8::]/32`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(AddressPattern::Wildcard);
        }
        let invalid = || DocumentParseError::InvalidIpAddress(s.to_string());

        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let addr = addr.trim_start_matches('[').trim_end_matches(']');
        let ip = IpAddr::from_str(addr).map_err(|_| invalid())?;
        let prefix_len = match (prefix, ip) {
            (None, IpAddr::V4(_)) => 32,
            (None, IpAddr::V6(_)) => 128,
            (Some(mask), IpAddr::V4(_)) if mask.contains('.') => {
                let mask = Ipv4Addr::from_str(mask).map_err(|_| invalid())?;
                ipnet::ipv4_mask_to_prefix(mask).map_err(|_| invalid())?
            }
            (Some(len), _) => len.parse::<u8>().context("address prefix length")?,
        };
        let network = IpNet::new(ip, prefix_len).map_err(|_| invalid())?;
        Ok(AddressPattern::Network(network))
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AddressPattern::Wildcard => f.write_str("*"),
            AddressPattern::Network(IpNet::V6(net)) if net.prefix_len() == 128 => {
                write!(f, "[{}]", net.addr())
            }
            AddressPattern::Network(IpNet::V6(net)) => {
                write!(f, "[{}]/{}", net.addr(), net.prefix_len())
            }
            AddressPattern::Network(IpNet::V4(net)) if net.prefix_len() == 32 => {
                write!(f, "{}", net.addr())
            }
            AddressPattern::Network(net) => write!(f, "{}", net),
        }
    }
}

/// The port part of an exit policy rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortPattern {
    Wildcard,
    Ports(PortRange),
}

impl PortPattern {
    pub fn contains(&self, port: u16) -> bool {
        match self {
            PortPattern::Wildcard => true,
            PortPattern::Ports(range) => range.contains(port),
        }
    }
}

impl fmt::Display for PortPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortPattern::Wildcard => f.write_str("*"),
            PortPattern::Ports(range) => write!(f, "{}", range),
        }
    }
}

/// One `accept`/`reject` line of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitPolicyRule {
    pub policy_type: ExitPolicyType,
    pub address: AddressPattern,
    pub port: PortPattern,
}

impl ExitPolicyRule {
    /// Parse the `address:port` argument of an `accept` or `reject` item.
    pub fn parse(policy_type: ExitPolicyType, arg: &str) -> Result<Self, DocumentParseError> {
        let (address, port) = arg
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| DocumentParseError::MalformedExitPolicy {
                raw: arg.to_string(),
            })?;
        let port = match port {
            "*" => PortPattern::Wildcard,
            _ => PortPattern::Ports(port.parse()?),
        };
        Ok(ExitPolicyRule {
            policy_type,
            address: address.parse()?,
            port,
        })
    }

    pub fn matches(&self, ip: IpAddr, port: u16) -> bool {
        self.address.matches(ip) && self.port.contains(port)
    }
}

impl fmt::Display for ExitPolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}:{}", self.policy_type, self.address, self.port)
    }
}

/// A descriptor's full exit policy. Rules are evaluated in order and the
/// first match decides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitPolicy {
    pub rules: Vec<ExitPolicyRule>,
}

impl ExitPolicy {
    pub(crate) fn push(&mut self, rule: ExitPolicyRule) {
        self.rules.push(rule);
    }

    /// Whether connections to `ip:port` are allowed. An address no rule
    /// matches is accepted.
    pub fn allows(&self, ip: IpAddr, port: u16) -> bool {
        self.rules
            .iter()
            .find(|rule| rule.matches(ip, port))
            .map_or(true, |rule| rule.policy_type == ExitPolicyType::Accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condensed_policy() {
        let policy: CondensedExitPolicy = "accept 80,443,6660-6669".parse().unwrap();
        assert!(policy.allows_port(443));
        assert!(policy.allows_port(6665));
        assert!(!policy.allows_port(22));
        assert_eq!(policy.to_string(), "accept 80,443,6660-6669");

        let reject: CondensedExitPolicy = "reject 25,119".parse().unwrap();
        assert!(reject.allows_port(80));
        assert!(!reject.allows_port(25));

        assert!(!CondensedExitPolicy::default().allows_port(80));
        assert!("allow 80".parse::<CondensedExitPolicy>().is_err());
        assert!("accept 80-x".parse::<CondensedExitPolicy>().is_err());
    }

    #[test]
    fn rules_first_match_wins() {
        let mut policy = ExitPolicy::default();
        for (t, arg) in [
            (ExitPolicyType::Reject, "10.0.0.0/8:*"),
            (ExitPolicyType::Reject, "192.168.0.0/255.255.0.0:*"),
            (ExitPolicyType::Accept, "*:80-443"),
            (ExitPolicyType::Reject, "*:*"),
        ] {
            policy.push(ExitPolicyRule::parse(t, arg).unwrap());
        }
        let public: IpAddr = "93.184.216.34".parse().unwrap();
        assert!(policy.allows(public, 443));
        assert!(!policy.allows(public, 22));
        assert!(!policy.allows("10.1.2.3".parse().unwrap(), 80));
        assert!(!policy.allows("192.168.1.1".parse().unwrap(), 80));
        assert_eq!(policy.rules[1].to_string(), "reject 192.168.0.0/16:*");
    }

    #[test]
    fn ipv6_rules() {
        let rule = ExitPolicyRule::parse(ExitPolicyType::Accept, "[2001:db8::]/32:443").unwrap();
        assert!(rule.matches("2001:db8::1".parse().unwrap(), 443));
        assert!(!rule.matches("2001:db9::1".parse().unwrap(), 443));
        assert_eq!(rule.to_string(), "accept [2001:db8::]/32:443");

        let host = ExitPolicyRule::parse(ExitPolicyType::Reject, "[::1]:*").unwrap();
        assert_eq!(host.to_string(), "reject [::1]:*");
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!(ExitPolicyRule::parse(ExitPolicyType::Accept, "*").is_err());
        assert!(ExitPolicyRule::parse(ExitPolicyType::Accept, "1.2.3:80").is_err());
        assert!(ExitPolicyRule::parse(ExitPolicyType::Accept, "1.2.3.4/40:80").is_err());
    }
}
