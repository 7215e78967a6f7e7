use log::{info, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::crypto::{CryptoError, Encryptor, KEY_LEN};

pub const DEFAULT_MAX_MAPPINGS: usize = 500;
const MAPPING_FILE: &str = "ip_mapping.json";
const KEY_FILE: &str = "mask_key.key";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {path} is malformed (expected {expected} bytes)")]
    KeyFormat { path: PathBuf, expected: usize },
    #[error("failed to encode mapping store: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// Maximal dotted digit runs. IPv4 literals are peeled out of a run
// group-wise, which reproduces a digit-boundary rule without lookaround:
// a group start inside a run is always dot-preceded, and the literal's
// last group must be consumed whole, so `1.2.3.4.5` yields `1.2.3.4`
// and never `2.3.4.5`.
static RE_IPV4_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+){3,}").unwrap());

fn is_octet(s: &str) -> bool {
    !s.is_empty() && s.len() <= 3 && s.parse::<u16>().map_or(false, |v| v <= 255)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingEntry {
    original: String,
    pseudonym: String,
    /// AES-GCM seal of the original, kept as an integrity tag for the
    /// entry; not required for mask/unmask correctness.
    tag: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MappingStore {
    /// Monotonic pseudonym counter. Independent of the live entry count
    /// so trimming can never re-issue a pseudonym.
    counter: u64,
    entries: Vec<MappingEntry>,
}

/// Reversible IP pseudonymization over a durable, bounded mapping.
///
/// One instance owns the mapping and key files under its storage
/// directory; concurrent instances on the same path are not coordinated
/// (last writer wins). The map is loaded once at open, trimmed to the
/// configured bound, and flushed synchronously on every mutation.
pub struct IpMasker {
    dir: PathBuf,
    max_mappings: usize,
    store: MappingStore,
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    encryptor: Encryptor,
}

impl IpMasker {
    pub fn open(state_dir: &Path, max_mappings: usize) -> Result<Self, StorageError> {
        fs::create_dir_all(state_dir).map_err(|source| StorageError::Write {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let encryptor = Encryptor::new(&load_or_create_key(&state_dir.join(KEY_FILE))?);

        let mapping_path = state_dir.join(MAPPING_FILE);
        let mut store = load_store(&mapping_path, &encryptor);

        let mut masker = IpMasker {
            dir: state_dir.to_path_buf(),
            max_mappings,
            forward: HashMap::new(),
            reverse: HashMap::new(),
            encryptor,
            store: MappingStore::default(),
        };

        // Capacity is enforced only at load time; a live session may
        // exceed the bound until the next open.
        if store.entries.len() > max_mappings {
            let excess = store.entries.len() - max_mappings;
            store.entries.drain(..excess);
            info!("trimmed mapping store to {max_mappings} entries ({excess} oldest dropped)");
            masker.store = store;
            masker.rebuild_indexes();
            masker.persist()?;
        } else {
            masker.store = store;
            masker.rebuild_indexes();
        }

        Ok(masker)
    }

    fn rebuild_indexes(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        for e in &self.store.entries {
            self.forward.insert(e.original.clone(), e.pseudonym.clone());
            self.reverse.insert(e.pseudonym.clone(), e.original.clone());
        }
    }

    fn mapping_path(&self) -> PathBuf {
        self.dir.join(MAPPING_FILE)
    }

    fn persist(&self) -> Result<(), StorageError> {
        let encoded = serde_json::to_string_pretty(&self.store)?;
        let path = self.mapping_path();
        fs::write(&path, encoded).map_err(|source| StorageError::Write { path, source })
    }

    /// Pseudonymize one IPv4 literal. An already-known address returns
    /// its existing pseudonym; a new one is synthesized, recorded in
    /// both directions, and flushed to disk before returning.
    ///
    /// On a flush failure the in-memory mapping keeps the new pair:
    /// masking stays functional for the session but will not survive a
    /// restart.
    pub fn mask_ip(&mut self, ip: &str) -> Result<String, StorageError> {
        if let Some(p) = self.forward.get(ip) {
            return Ok(p.clone());
        }

        let pseudonym = self.synthesize_pseudonym(ip);
        let tag = self.encryptor.encrypt(ip.as_bytes())?;
        self.store.counter += 1;
        self.store.entries.push(MappingEntry {
            original: ip.to_string(),
            pseudonym: pseudonym.clone(),
            tag,
        });
        self.forward.insert(ip.to_string(), pseudonym.clone());
        self.reverse.insert(pseudonym.clone(), ip.to_string());

        self.persist()?;
        Ok(pseudonym)
    }

    /// Pseudonyms live in the private range matching the class of the
    /// original's first octet, so masked output still reads like real
    /// infrastructure addresses.
    fn synthesize_pseudonym(&self, ip: &str) -> String {
        let first_octet: u16 = ip.split('.').next().and_then(|o| o.parse().ok()).unwrap_or(0);
        let prefix = match first_octet {
            1..=126 => "10.0",
            128..=191 => "172.16",
            192..=223 => "192.168",
            _ => "169.254",
        };
        let n = self.store.counter;
        format!("{}.{}.{}", prefix, n % 256, (n / 256) % 256)
    }

    /// Reverse lookup; echoes the input back when unknown. Never fails.
    pub fn unmask_ip(&self, pseudonym: &str) -> String {
        self.reverse.get(pseudonym).cloned().unwrap_or_else(|| pseudonym.to_string())
    }

    /// Replace every IPv4 literal with its pseudonym, left to right.
    /// Storage failures are logged and do not interrupt the scan; the
    /// substitutions still come from the (updated) in-memory mapping.
    pub fn mask_text(&mut self, text: &str) -> String {
        if text.is_empty() {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in RE_IPV4_RUN.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            self.mask_run(m.as_str(), &mut out);
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    /// Left-to-right, non-overlapping scan over one dotted run: any four
    /// consecutive whole groups that are all in-range octets form a
    /// literal; everything else passes through.
    fn mask_run(&mut self, run: &str, out: &mut String) {
        let groups: Vec<&str> = run.split('.').collect();
        let mut pieces: Vec<String> = Vec::new();
        let mut i = 0;
        while i < groups.len() {
            if i + 4 <= groups.len() && groups[i..i + 4].iter().all(|g| is_octet(g)) {
                let literal = groups[i..i + 4].join(".");
                let pseudonym = match self.mask_ip(&literal) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("mapping store flush failed, pseudonym kept in memory only: {e}");
                        self.forward
                            .get(&literal)
                            .cloned()
                            .unwrap_or_else(|| literal.clone())
                    }
                };
                pieces.push(pseudonym);
                i += 4;
            } else {
                pieces.push(groups[i].to_string());
                i += 1;
            }
        }
        out.push_str(&pieces.join("."));
    }

    /// Substitute every known pseudonym back to its original. With no
    /// known pseudonyms the input passes through unchanged.
    pub fn unmask_text(&self, text: &str) -> String {
        if text.is_empty() || self.reverse.is_empty() {
            return text.to_string();
        }
        // Longest first so a pseudonym that prefixes another can never
        // shadow it in the alternation.
        let mut pseudonyms: Vec<&str> =
            self.store.entries.iter().map(|e| e.pseudonym.as_str()).collect();
        pseudonyms.sort_by(|a, b| b.len().cmp(&a.len()));
        let alternation =
            pseudonyms.iter().map(|p| regex::escape(p)).collect::<Vec<_>>().join("|");
        let Ok(re) = Regex::new(&alternation) else {
            return text.to_string();
        };
        re.replace_all(text, |caps: &regex::Captures| self.unmask_ip(&caps[0]))
            .into_owned()
    }

    /// Drop every mapping in both directions and persist the empty state.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.store = MappingStore::default();
        self.forward.clear();
        self.reverse.clear();
        self.persist()
    }

    /// Read-only pseudonym -> original snapshot for display.
    pub fn get_mapping(&self) -> BTreeMap<String, String> {
        self.store
            .entries
            .iter()
            .map(|e| (e.pseudonym.clone(), e.original.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.entries.is_empty()
    }
}

fn load_or_create_key(path: &Path) -> Result<[u8; KEY_LEN], StorageError> {
    if path.exists() {
        let bytes = fs::read(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        return bytes.try_into().map_err(|_| StorageError::KeyFormat {
            path: path.to_path_buf(),
            expected: KEY_LEN,
        });
    }
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill(&mut key);
    fs::write(path, key).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(key)
}

/// An unreadable or corrupt mapping file degrades to an empty mapping
/// rather than failing the open. Entries whose integrity tag no longer
/// verifies are kept (the tag is not the correctness boundary) but
/// reported.
fn load_store(path: &Path, encryptor: &Encryptor) -> MappingStore {
    let Ok(raw) = fs::read_to_string(path) else {
        return MappingStore::default();
    };
    let store: MappingStore = match serde_json::from_str(&raw) {
        Ok(s) => s,
        Err(e) => {
            warn!("mapping store {} is corrupt, starting empty: {e}", path.display());
            return MappingStore::default();
        }
    };
    for entry in &store.entries {
        match encryptor.decrypt(&entry.tag) {
            Ok(plain) if plain == entry.original.as_bytes() => {}
            _ => warn!(
                "integrity tag mismatch for mapping entry {} -> {}",
                entry.original, entry.pseudonym
            ),
        }
    }
    store
}
