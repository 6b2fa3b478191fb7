//! Relay fingerprints

use std::fmt;
use std::str::FromStr;

use crate::error::DocumentParseError;

/// Length of a fingerprint in bytes (a SHA-1 digest)
pub const FINGERPRINT_LEN: usize = 20;

/// A relay fingerprint, i.e. the SHA-1 digest of its RSA identity key.
///
/// Fingerprints are stored as raw bytes, so the hex form found in descriptors
/// (possibly split into groups of four) and the base64 form found in
/// consensus documents compare equal whenever they encode the same digest.
/// The same type is used for document digests, which share the format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Build a fingerprint from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Fingerprint, DocumentParseError> {
        if bytes.len() != FINGERPRINT_LEN {
            return Err(DocumentParseError::invalid_fingerprint(format!(
                "{} bytes",
                bytes.len()
            )));
        }
        let mut inner = [0u8; FINGERPRINT_LEN];
        inner.copy_from_slice(bytes);
        Ok(Fingerprint(inner))
    }

    /// Parse a hex fingerprint.
    ///
    /// Whitespace is ignored, as is a leading `$`. Both upper and lower case
    /// digits are accepted.
    pub fn from_str_hex(s: &str) -> Result<Fingerprint, DocumentParseError> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let digits: String = trimmed
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        let mut inner = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(&digits, &mut inner)
            .map_err(|_| DocumentParseError::invalid_fingerprint(s))?;
        Ok(Fingerprint(inner))
    }

    /// Parse a base64 fingerprint as used in consensus documents (padding optional).
    pub fn from_str_b64(s: &str) -> Result<Fingerprint, DocumentParseError> {
        let unpadded = s.trim().trim_end_matches('=');
        let bytes = base64::decode_config(unpadded, base64::STANDARD_NO_PAD)
            .map_err(|_| DocumentParseError::invalid_fingerprint(s))?;
        Fingerprint::from_bytes(&bytes).map_err(|_| DocumentParseError::invalid_fingerprint(s))
    }

    /// Unpadded base64, the form used in consensus `r` lines.
    pub fn to_b64(&self) -> String {
        base64::encode_config(self.0, base64::STANDARD_NO_PAD)
    }
}

impl From<[u8; FINGERPRINT_LEN]> for Fingerprint {
    fn from(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Fingerprint(bytes)
    }
}

impl FromStr for Fingerprint {
    type Err = DocumentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::from_str_hex(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "9695DFC35FFEB861329B9F1AB04C46397020CE31";
    const B64: &str = "lpXfw1/+uGEym58asExGOXAgzjE";

    #[test]
    fn encodings_compare_equal() {
        let upper = Fingerprint::from_str_hex(HEX).unwrap();
        let lower = Fingerprint::from_str_hex(&HEX.to_lowercase()).unwrap();
        let grouped =
            Fingerprint::from_str_hex("9695 DFC3 5FFE B861 329B 9F1A B04C 4639 7020 CE31").unwrap();
        let dollar = Fingerprint::from_str_hex(&format!("${}", HEX)).unwrap();
        let b64 = Fingerprint::from_str_b64(B64).unwrap();
        let padded = Fingerprint::from_str_b64(&format!("{}=", B64)).unwrap();

        for other in [lower, grouped, dollar, b64, padded] {
            assert_eq!(upper, other);
        }

        let mut set = std::collections::HashSet::new();
        set.insert(upper);
        assert!(set.contains(&b64));
    }

    #[test]
    fn display_is_uppercase_hex() {
        let fp: Fingerprint = HEX.to_lowercase().parse().unwrap();
        assert_eq!(fp.to_string(), HEX);
        assert_eq!(fp.to_b64(), B64);
    }

    #[test]
    fn hex_keeps_leading_zeros() {
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes[0] = 0x0a;
        bytes[19] = 0x01;
        let fp = Fingerprint::from(bytes);
        let hex = fp.to_string();
        assert_eq!(hex, "0A00000000000000000000000000000000000001");
        assert_eq!(Fingerprint::from_str_hex(&hex.to_lowercase()).unwrap(), fp);
        assert!(Fingerprint::from_str_hex(&format!("{} 0", hex)).is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            Fingerprint::from_str_hex(&HEX[..38]),
            Err(DocumentParseError::InvalidFingerprint { .. })
        ));
        assert!(matches!(
            Fingerprint::from_str_b64(&B64[..20]),
            Err(DocumentParseError::InvalidFingerprint { .. })
        ));
        assert!(Fingerprint::from_bytes(&[0u8; 19]).is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        let bad = format!("{}ZZ", &HEX[..38]);
        assert!(matches!(
            Fingerprint::from_str_hex(&bad),
            Err(DocumentParseError::InvalidFingerprint { .. })
        ));
        let signed = format!("+{}", &HEX[1..]);
        assert!(Fingerprint::from_str_hex(&signed).is_err());
        assert!(Fingerprint::from_str_b64("lpXfw1/+uGEym58asExGOXAgz!E").is_err());
    }
}
