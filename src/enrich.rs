use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::catalog::{Catalog, RoleRule};
use crate::parser::LogRecord;

static RE_IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());

static RE_SRC_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:from|source|src|attacker)").unwrap());

static RE_DST_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:to|dest|destination|target)").unwrap());

static RE_ATTACK_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:attack|hack|exploit|scan|brute|force|failed|rejected|blocked|denied|malicious)")
        .unwrap()
});

static RE_VICTIM_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:victim|compromised|targeted)").unwrap());

/// Annotates records with attacker/target attribution and threat
/// classification. Holds an immutable catalog injected at construction
/// so tests can substitute their own registries.
#[derive(Debug, Clone)]
pub struct Enricher {
    catalog: Catalog,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(Catalog::default_catalog())
    }
}

impl Enricher {
    pub fn new(catalog: Catalog) -> Self {
        Enricher { catalog }
    }

    /// Annotate every record in place. Records without inspectable text
    /// pass through unmodified; enrichment never fails.
    pub fn enrich(&self, records: &mut [LogRecord]) {
        for rec in records.iter_mut() {
            self.enrich_record(rec);
        }
    }

    pub fn enrich_record(&self, rec: &mut LogRecord) {
        let Some(text) = rec.text().map(str::to_owned) else {
            return;
        };

        // Attack pass: catalog order is priority, first match wins.
        for pat in &self.catalog.attack_patterns {
            let Some(caps) = pat.detector.captures(&text) else {
                continue;
            };
            match pat.role {
                RoleRule::AttackerAndTarget => {
                    rec.attacker_ip = caps.get(1).map(|g| g.as_str().to_string());
                    rec.target_ip = caps.get(2).map(|g| g.as_str().to_string());
                    rec.threat_type = Some(pat.friendly_name.to_string());
                }
                RoleRule::LabelAndAttacker => {
                    rec.attacker_ip = caps.get(2).map(|g| g.as_str().to_string());
                    rec.threat_type = caps.get(1).map(|g| g.as_str().to_string());
                }
                RoleRule::SingleAttacker => {
                    rec.attacker_ip = caps.get(1).map(|g| g.as_str().to_string());
                    rec.threat_type = Some(pat.friendly_name.to_string());
                }
            }
            break;
        }

        // Signature pass, independent of the attack pass.
        for sig in &self.catalog.threat_signatures {
            if sig.detector.is_match(&text) {
                rec.severity = Some(sig.severity);
                rec.threat_description = Some(sig.description.to_string());
                break;
            }
        }

        if rec.attacker_ip.is_none() || rec.target_ip.is_none() {
            infer_ip_roles(rec, &text);
        }
    }
}

/// Fallback attribution when the catalog left a role unassigned:
/// keyword proximity over the raw IPv4 literals in the text.
fn infer_ip_roles(rec: &mut LogRecord, text: &str) {
    let ips: Vec<&str> = RE_IPV4.find_iter(text).map(|m| m.as_str()).collect();
    if ips.is_empty() {
        return;
    }

    if ips.len() >= 2 {
        if RE_SRC_KEYWORD.is_match(text) && rec.attacker_ip.is_none() {
            if let Some(ip) = first_ip_after_keyword(text, &ips, r"(?:from|source|src|attacker)") {
                rec.attacker_ip = Some(ip.to_string());
            }
        }
        if RE_DST_KEYWORD.is_match(text) && rec.target_ip.is_none() {
            if let Some(ip) = first_ip_after_keyword(text, &ips, r"(?:to|dest|destination|target)") {
                rec.target_ip = Some(ip.to_string());
            }
        }
        // No keyword evidence at all: first IP is the source, second the target.
        if rec.attacker_ip.is_none() && rec.target_ip.is_none() {
            rec.attacker_ip = Some(ips[0].to_string());
            rec.target_ip = Some(ips[1].to_string());
        }
    } else {
        let ip = ips[0];
        if RE_ATTACK_KEYWORD.is_match(text) {
            if rec.attacker_ip.is_none() {
                rec.attacker_ip = Some(ip.to_string());
            }
        } else if RE_VICTIM_KEYWORD.is_match(text) && rec.target_ip.is_none() {
            rec.target_ip = Some(ip.to_string());
        }
    }
}

/// First keyword-then-IP co-occurrence wins: IPs are tried in document
/// order against a `keyword.*?ip` probe.
fn first_ip_after_keyword<'a>(text: &str, ips: &[&'a str], keyword_alt: &str) -> Option<&'a str> {
    for ip in ips {
        let probe = format!(r"{}.*?{}", keyword_alt, regex::escape(ip));
        let Ok(re) = RegexBuilder::new(&probe).case_insensitive(true).build() else {
            continue;
        };
        if re.is_match(text) {
            return Some(ip);
        }
    }
    None
}
