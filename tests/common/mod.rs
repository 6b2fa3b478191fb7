#![allow(dead_code)]

use std::fmt::Write;

use tordir::Fingerprint;

pub const TEST_FINGERPRINT: &str = "9695DFC35FFEB861329B9F1AB04C46397020CE31";

/// Fingerprint of the n-th generated relay; index `special` gets `TEST_FINGERPRINT`.
pub fn relay_fingerprint(n: usize, special: usize) -> Fingerprint {
    if n == special {
        return TEST_FINGERPRINT.parse().unwrap();
    }
    let mut bytes = [0u8; 20];
    bytes[..8].copy_from_slice(&(n as u64).to_be_bytes());
    bytes[19] = 0xaa;
    Fingerprint::from(bytes)
}

pub fn consensus_entry(nickname: &str, fingerprint: &Fingerprint, bandwidth: u64) -> String {
    format!(
        "r {nickname} {} AAAAAAAAAAAAAAAAAAAAAAAAAAA 2015-07-31 23:12:42 198.51.100.7 9001 0\n\
         s Fast Running Stable Valid\n\
         v Tor 0.2.6.10\n\
         pr Cons=1-2 Desc=1-2 DirCache=1 HSDir=1 HSIntro=3 HSRend=1 Link=1-4 LinkAuth=1 Microdesc=1-2 Relay=1-2\n\
         w Bandwidth={bandwidth}\n\
         p reject 1-65535\n",
        fingerprint.to_b64()
    )
}

/// A consensus with `count` router status entries, the one at `special`
/// having `TEST_FINGERPRINT`.
pub fn consensus(count: usize, special: usize) -> String {
    let mut text = String::from(
        "@type network-status-consensus-3 1.0\n\
         network-status-version 3\n\
         vote-status consensus\n\
         consensus-method 20\n\
         valid-after 2015-08-01 00:00:00\n\
         fresh-until 2015-08-01 01:00:00\n\
         valid-until 2015-08-01 03:00:00\n\
         voting-delay 300 300\n\
         known-flags Authority BadExit Exit Fast Guard HSDir Running Stable V2Dir Valid\n\
         params CircuitPriorityHalflifeMsec=30000 NumDirectoryGuards=3\n\
         dir-source moria1 D586D18309DED4CD6D57C18FDB97EFA96D330566 128.31.0.34 128.31.0.34 9131 9101\n\
         contact 1024D/28988BF5 arma mit edu\n\
         vote-digest 7DF7FD0FC52FBBA0F4A6B1AD8A2F4B3C5DA2A9F0\n",
    );
    for n in 0..count {
        let fp = relay_fingerprint(n, special);
        text.push_str(&consensus_entry(&format!("relay{n}"), &fp, 100 + n as u64));
    }
    text.push_str(
        "directory-footer\n\
         bandwidth-weights Wbd=0 Wbe=0 Wbg=4203 Wbm=10000 Wdb=10000\n\
         directory-signature D586D18309DED4CD6D57C18FDB97EFA96D330566 4A7CF1F3B2D44CDB3C4D3E8CB1A0F4A9B6F5E7D1\n\
         -----BEGIN SIGNATURE-----\n\
         ZmFrZSBzaWduYXR1cmU=\n\
         -----END SIGNATURE-----\n",
    );
    text
}

/// Hex fingerprint split into groups of four, as in descriptors
pub fn grouped_hex(fingerprint: &Fingerprint) -> String {
    let hex = fingerprint.to_string();
    let groups: Vec<&str> = (0..10).map(|i| &hex[4 * i..4 * i + 4]).collect();
    groups.join(" ")
}

pub fn descriptor(nickname: &str, fingerprint: &Fingerprint, published: &str) -> String {
    let mut text = String::new();
    writeln!(text, "@type server-descriptor 1.0").unwrap();
    writeln!(text, "router {nickname} 203.0.113.5 9001 0 0").unwrap();
    writeln!(text, "platform Tor 0.2.6.10 on Linux").unwrap();
    writeln!(text, "protocols Link 1 2 Circuit 1").unwrap();
    writeln!(text, "published {published}").unwrap();
    writeln!(text, "fingerprint {}", grouped_hex(fingerprint)).unwrap();
    writeln!(text, "uptime 86400").unwrap();
    writeln!(text, "bandwidth 5242880 10485760 1398784").unwrap();
    text.push_str(
        "onion-key\n\
         -----BEGIN RSA PUBLIC KEY-----\n\
         MIGJAoGBAMbC1vKBJsm0lfdeAhHnqmC0wc2M3U2Z\n\
         -----END RSA PUBLIC KEY-----\n\
         signing-key\n\
         -----BEGIN RSA PUBLIC KEY-----\n\
         MIGJAoGBAOy8oW0ooZ0c3WBa3D8VQJ8C3bM0PKGx\n\
         -----END RSA PUBLIC KEY-----\n",
    );
    writeln!(text, "hidden-service-dir").unwrap();
    writeln!(text, "contact operator at example dot com").unwrap();
    writeln!(text, "reject *:*").unwrap();
    text.push_str(
        "router-signature\n\
         -----BEGIN SIGNATURE-----\n\
         ZmFrZSBzaWduYXR1cmU=\n\
         -----END SIGNATURE-----\n",
    );
    text
}

/// A descriptor file with `count` descriptors, the one at `special`
/// having `TEST_FINGERPRINT`.
pub fn descriptors(count: usize, special: usize) -> String {
    (0..count)
        .map(|n| {
            descriptor(
                &format!("relay{n}"),
                &relay_fingerprint(n, special),
                "2015-07-31 08:02:11",
            )
        })
        .collect()
}
