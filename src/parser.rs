use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::catalog::Severity;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no interpretable structure in {path}: {detail}")]
    Structure { path: String, detail: String },
}

/// One logical unit of log data. Exactly one of `raw_text`,
/// `timestamp`+`message`, or `fields` is populated by the tokenizer;
/// the enrichment fields start empty and are set at most once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacker_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_description: Option<String>,
}

impl LogRecord {
    pub fn from_raw(line: &str) -> Self {
        LogRecord { raw_text: Some(line.to_string()), ..Default::default() }
    }

    pub fn from_timestamped(timestamp: String, message: String) -> Self {
        LogRecord { timestamp: Some(timestamp), message: Some(message), ..Default::default() }
    }

    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        LogRecord { fields: Some(fields), ..Default::default() }
    }

    /// Text the enrichment engine inspects: `raw_text` first, then `message`.
    pub fn text(&self) -> Option<&str> {
        self.raw_text.as_deref().or(self.message.as_deref())
    }

    /// Single-line rendering for context displays.
    pub fn display_line(&self) -> String {
        if let Some(raw) = &self.raw_text {
            return raw.clone();
        }
        if let (Some(ts), Some(msg)) = (&self.timestamp, &self.message) {
            return format!("{ts} {msg}");
        }
        if let Some(fields) = &self.fields {
            let vals: Vec<&str> = fields.values().map(String::as_str).collect();
            return vals.join(" ");
        }
        String::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Delimited,
    LineOriented,
}

pub fn hint_for_path(path: &Path) -> FormatHint {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => FormatHint::Delimited,
        // .log, .txt and unknown extensions all parse as plain text
        _ => FormatHint::LineOriented,
    }
}

/// Parse a log file into an ordered record sequence. A parse failure is
/// fatal for the file: no partial sequence is returned.
pub fn parse_file(path: &Path) -> Result<Vec<LogRecord>, ParseError> {
    let bytes = fs::read(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    parse_content(&content, hint_for_path(path), &path.display().to_string())
}

pub fn parse_content(
    content: &str,
    hint: FormatHint,
    origin: &str,
) -> Result<Vec<LogRecord>, ParseError> {
    match hint {
        FormatHint::Delimited => parse_delimited(content).map_err(|detail| ParseError::Structure {
            path: origin.to_string(),
            detail,
        }),
        FormatHint::LineOriented => Ok(parse_lines(content)),
    }
}

const DELIMITER_CANDIDATES: &[char] = &[',', ';', '\t', '|'];
const SNIFF_SAMPLE_BYTES: usize = 4096;

fn parse_delimited(content: &str) -> Result<Vec<LogRecord>, String> {
    // Comma is the declared delimiter; fall back to sniffing when it
    // does not yield a consistent multi-column layout.
    let delimiter = if is_consistent(content, ',') { ',' } else { sniff_delimiter(content)? };

    let mut rows = content.lines().filter(|l| !l.trim().is_empty());
    let header_line = rows.next().ok_or_else(|| "empty delimited file".to_string())?;
    let header = split_header(header_line, delimiter);

    let mut records = Vec::new();
    for row in rows {
        let cells: Vec<&str> = row.split(delimiter).collect();
        let mut fields = BTreeMap::new();
        for (idx, cell) in cells.iter().enumerate() {
            let key = match header.get(idx) {
                Some(name) => name.clone(),
                None => format!("col{}", idx + 1),
            };
            fields.insert(key, cell.trim().to_string());
        }
        records.push(LogRecord::from_fields(fields));
    }
    Ok(records)
}

fn split_header(line: &str, delimiter: char) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    line.split(delimiter)
        .map(|cell| {
            let name = cell.trim().to_string();
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                format!("{}_{}", name, count)
            } else {
                name
            }
        })
        .collect()
}

/// A delimiter is consistent when the header splits into at least two
/// columns and every sampled line splits into the same count.
fn is_consistent(content: &str, delimiter: char) -> bool {
    let sample = sample_head(content);
    let mut counts = sample
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split(delimiter).count());
    match counts.next() {
        Some(first) if first >= 2 => counts.all(|c| c == first),
        _ => false,
    }
}

/// Sample the head of the file and pick the candidate whose column
/// count is most consistent across sampled lines (ties go to the
/// candidate producing more columns).
fn sniff_delimiter(content: &str) -> Result<char, String> {
    let sample = sample_head(content);
    let lines: Vec<&str> = sample.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Err("no sample lines for delimiter detection".to_string());
    }

    let mut best: Option<(char, usize, usize)> = None; // (delim, consistent_lines, columns)
    for &cand in DELIMITER_CANDIDATES {
        let counts: Vec<usize> = lines.iter().map(|l| l.split(cand).count()).collect();
        let mode = mode_of(&counts);
        if mode < 2 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == mode).count();
        let better = match best {
            None => true,
            Some((_, bc, bm)) => consistent > bc || (consistent == bc && mode > bm),
        };
        if better {
            best = Some((cand, consistent, mode));
        }
    }
    best.map(|(c, _, _)| c)
        .ok_or_else(|| "no delimiter candidate yields a multi-column layout".to_string())
}

fn mode_of(counts: &[usize]) -> usize {
    let mut tally: BTreeMap<usize, usize> = BTreeMap::new();
    for &c in counts {
        *tally.entry(c).or_insert(0) += 1;
    }
    tally
        .into_iter()
        .max_by_key(|&(count, occurrences)| (occurrences, count))
        .map(|(count, _)| count)
        .unwrap_or(0)
}

fn sample_head(content: &str) -> &str {
    if content.len() <= SNIFF_SAMPLE_BYTES {
        return content;
    }
    let mut end = SNIFF_SAMPLE_BYTES;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

// Timestamp conventions, in priority order. The Apache bracketed form
// may appear anywhere in the line; the rest must open it.
static TS_CONVENTIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2})").unwrap(),
        Regex::new(r"^(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2})").unwrap(),
        Regex::new(r"\[(\d{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}\s+[+-]\d{4})\]").unwrap(),
        Regex::new(r"^(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})").unwrap(),
    ]
});

const DETECTION_SAMPLE_LINES: usize = 10;

fn detect_convention(lines: &[&str]) -> Option<&'static Regex> {
    let sample = &lines[..lines.len().min(DETECTION_SAMPLE_LINES)];
    TS_CONVENTIONS
        .iter()
        .find(|re| sample.iter().all(|line| re.is_match(line)))
}

pub fn parse_lines(content: &str) -> Vec<LogRecord> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let Some(convention) = detect_convention(&lines) else {
        return lines.iter().map(|l| LogRecord::from_raw(l)).collect();
    };

    // Every matching line opens a record; non-matching lines fold into
    // the open record's message.
    let mut records: Vec<LogRecord> = Vec::new();
    for line in &lines {
        match convention.captures(line) {
            Some(caps) => {
                let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
                let ts = caps.get(1).map(|g| g.as_str()).unwrap_or("").to_string();
                let mut rest = String::new();
                rest.push_str(line[..whole.0].trim());
                if !rest.is_empty() && !line[whole.1..].trim().is_empty() {
                    rest.push(' ');
                }
                rest.push_str(line[whole.1..].trim());
                records.push(LogRecord::from_timestamped(ts, rest));
            }
            None => match records.last_mut() {
                Some(rec) => {
                    let msg = rec.message.get_or_insert_with(String::new);
                    if !msg.is_empty() {
                        msg.push('\n');
                    }
                    msg.push_str(line);
                }
                // unreachable while a convention is detected: the first
                // sampled line always matches
                None => records.push(LogRecord::from_raw(line)),
            },
        }
    }
    records
}
