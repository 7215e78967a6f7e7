use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalog::Severity;
use crate::parser::LogRecord;

pub const UNKNOWN_THREAT_LABEL: &str = "unknown threat";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl SeverityCounts {
    fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unknown => self.unknown += 1,
        }
    }
}

/// Corpus-level statistics over an enriched record sequence. Derived,
/// stateless, recomputed on demand.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SecuritySummary {
    pub total_entries: usize,
    pub identified_threats: usize,
    pub unique_attackers: BTreeSet<String>,
    pub unique_targets: BTreeSet<String>,
    /// Threat type tallies, descending by count; ties keep first-seen order.
    pub threat_types: Vec<(String, usize)>,
    pub severity_counts: SeverityCounts,
}

/// One pass over the records. A record is an identified threat iff
/// `threat_type` or `threat_description` is set; attacker/target sets
/// accumulate only from those records.
pub fn summarize(records: &[LogRecord]) -> SecuritySummary {
    let mut summary = SecuritySummary { total_entries: records.len(), ..Default::default() };
    let mut tallies: Vec<(String, usize)> = Vec::new();

    for rec in records {
        if rec.threat_type.is_none() && rec.threat_description.is_none() {
            continue;
        }
        summary.identified_threats += 1;

        if let Some(ip) = &rec.attacker_ip {
            summary.unique_attackers.insert(ip.clone());
        }
        if let Some(ip) = &rec.target_ip {
            summary.unique_targets.insert(ip.clone());
        }

        let label = rec.threat_type.as_deref().unwrap_or(UNKNOWN_THREAT_LABEL);
        match tallies.iter_mut().find(|(name, _)| name == label) {
            Some((_, count)) => *count += 1,
            None => tallies.push((label.to_string(), 1)),
        }

        summary.severity_counts.bump(rec.severity.unwrap_or(Severity::Unknown));
    }

    // Stable sort keeps first-seen order among equal counts.
    tallies.sort_by(|a, b| b.1.cmp(&a.1));
    summary.threat_types = tallies;
    summary
}

/// Render the records surrounding `index` for an alert display, one
/// record per line.
pub fn alert_context(records: &[LogRecord], index: usize, context_lines: usize) -> String {
    if records.is_empty() {
        return String::new();
    }
    let start = index.saturating_sub(context_lines);
    if start >= records.len() {
        return String::new();
    }
    let end = (index + context_lines + 1).min(records.len());
    records[start..end]
        .iter()
        .map(LogRecord::display_line)
        .collect::<Vec<_>>()
        .join("\n")
}
