//! Loading of bandwidth documents produced by the bulk-fetch step.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use color_eyre::eyre::{Context, Result};
use regex::Regex;

use super::types::*;

/// Relay fingerprints are 40 hex digits
static FINGERPRINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Fa-f]{40}$").expect("Invalid fingerprint regex"));

pub fn is_valid_fingerprint(s: &str) -> bool {
    FINGERPRINT.is_match(s)
}

/// Parse a bandwidth document from JSON text
pub fn parse_document(content: &str) -> Result<BandwidthDocument> {
    let document: BandwidthDocument =
        serde_json::from_str(content).context("Failed to parse bandwidth document JSON")?;

    for relay in &document.relays {
        if !is_valid_fingerprint(&relay.fingerprint) {
            log::warn!("Relay identifier '{}' is not a valid fingerprint", relay.fingerprint);
        }
    }

    Ok(document)
}

/// Load a single bandwidth document from disk
pub fn load_document(path: &Path) -> Result<BandwidthDocument> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bandwidth document: {}", path.display()))?;
    parse_document(&content).with_context(|| format!("In {}", path.display()))
}

/// Load and concatenate the relays of several documents, in argument order.
///
/// A document that cannot be read or parsed is skipped with a warning so one
/// bad fetch does not sink the batch. A fingerprint seen again in a later
/// document is dropped; the first occurrence wins.
pub fn load_documents(paths: &[PathBuf]) -> Vec<RelayHistory> {
    let mut relays = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped = 0;
    let mut duplicates = 0;

    for path in paths {
        match load_document(path) {
            Ok(document) => {
                for relay in document.relays {
                    if seen.insert(relay.fingerprint.clone()) {
                        relays.push(relay);
                    } else {
                        log::warn!(
                            "Relay {} appears more than once, ignoring the copy in {}",
                            relay.fingerprint,
                            path.display()
                        );
                        duplicates += 1;
                    }
                }
            }
            Err(e) => {
                log::warn!("Skipping {}: {:#}", path.display(), e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} unreadable bandwidth documents", skipped);
    }
    if duplicates > 0 {
        log::warn!("Dropped {} duplicate relay entries", duplicates);
    }
    log::info!("Loaded {} relays from {} documents", relays.len(), paths.len() - skipped);

    relays
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::decoder::{decode, TierPolicy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DOC: &str = r#"{
        "version": "8.0",
        "relays_published": "2024-10-01 12:00:00",
        "relays": [{
            "fingerprint": "0011BD2485AD45D984EC4159C88FC066E5E3300E",
            "write_history": {
                "1_month": {
                    "first": "2024-09-01 00:00:00",
                    "last": "2024-09-01 08:00:00",
                    "interval": 14400,
                    "factor": 0.5,
                    "count": 3,
                    "values": [10, null, 30]
                }
            },
            "read_history": {
                "1_month": {
                    "first": "2024-09-01 00:00:00",
                    "interval": 14400,
                    "values": [7]
                }
            }
        }, {
            "fingerprint": "not-a-fingerprint"
        }]
    }"#;

    #[test]
    fn test_parse_document() {
        let document = parse_document(DOC).unwrap();
        assert_eq!(document.relays.len(), 2);

        let relay = &document.relays[0];
        let block = relay.write_history.as_ref().unwrap().get("1_month").unwrap();
        assert_eq!(block.factor, Lenient::Valid(0.5));
        assert_eq!(block.values, vec![Some(10.0), None, Some(30.0)]);

        // factor defaults to 1
        let read = relay.read_history.as_ref().unwrap().get("1_month").unwrap();
        assert_eq!(read.factor, Lenient::Valid(1.0));

        assert!(document.relays[1].write_history.is_none());
        assert!(document.relays[1].read_history.is_none());
    }

    #[test]
    fn test_bad_tier_header_does_not_sink_document() {
        let doc = r#"{
            "relays": [{
                "fingerprint": "0011BD2485AD45D984EC4159C88FC066E5E3300E",
                "write_history": {
                    "1_week": {"first": null, "interval": 3600, "values": [1]},
                    "1_month": {"first": "2024-09-01 00:00:00", "interval": "14400", "values": [1]},
                    "3_months": {"first": "2024-09-01 00:00:00", "interval": 43200.5, "factor": null,
                                 "values": [1]},
                    "1_year": {"first": "2024-09-01 00:00:00", "interval": 86400, "count": 1.5,
                               "values": [2]}
                }
            }, {
                "fingerprint": "9695DFC35FFEB861329B9F1AB04C46397020CE31",
                "read_history": {
                    "1_month": {"first": "2024-09-01 00:00:00", "interval": 14400, "values": [3, 4]}
                }
            }]
        }"#;

        let document = parse_document(doc).unwrap();
        assert_eq!(document.relays.len(), 2);

        let write = document.relays[0].write_history.as_ref().unwrap();
        assert_eq!(write.len(), 4);
        assert!(write.get("1_week").unwrap().first.valid().is_none());
        assert!(write.get("1_month").unwrap().interval.valid().is_none());

        let outcome = decode(write, Direction::Write, &TierPolicy::All, None);
        assert_eq!(outcome.tiers_decoded, vec!["1_year".to_string()]);
        assert_eq!(outcome.errors.len(), 3);
    }

    #[test]
    fn test_duplicate_fingerprints_keep_first_document() {
        let mut first = NamedTempFile::new().unwrap();
        write!(first, "{}", DOC).unwrap();
        let mut second = NamedTempFile::new().unwrap();
        write!(
            second,
            r#"{{"relays": [{{"fingerprint": "0011BD2485AD45D984EC4159C88FC066E5E3300E", "nickname": "later"}}]}}"#
        )
        .unwrap();

        let relays = load_documents(&[first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(relays.len(), 2);
        let copies: Vec<&RelayHistory> = relays
            .iter()
            .filter(|r| r.fingerprint == "0011BD2485AD45D984EC4159C88FC066E5E3300E")
            .collect();
        assert_eq!(copies.len(), 1);
        assert!(copies[0].write_history.is_some());
    }

    #[test]
    fn test_fingerprint_validation() {
        assert!(is_valid_fingerprint("0011BD2485AD45D984EC4159C88FC066E5E3300E"));
        assert!(!is_valid_fingerprint("0011BD"));
        assert!(!is_valid_fingerprint("ZZ11BD2485AD45D984EC4159C88FC066E5E3300E"));
    }

    #[test]
    fn test_load_documents_skips_bad_files() {
        let mut good = NamedTempFile::new().unwrap();
        write!(good, "{}", DOC).unwrap();
        let mut bad = NamedTempFile::new().unwrap();
        write!(bad, "{{ not json").unwrap();

        let relays = load_documents(&[
            good.path().to_path_buf(),
            bad.path().to_path_buf(),
            PathBuf::from("/nonexistent/relays.json"),
        ]);
        assert_eq!(relays.len(), 2);
    }
}
