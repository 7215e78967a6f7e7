use logveil::catalog::Severity;
use logveil::parser::LogRecord;
use logveil::summary::{alert_context, summarize, UNKNOWN_THREAT_LABEL};

fn threat(threat_type: Option<&str>, attacker: Option<&str>, severity: Option<Severity>) -> LogRecord {
    LogRecord {
        raw_text: Some("line".to_string()),
        threat_type: threat_type.map(str::to_string),
        attacker_ip: attacker.map(str::to_string),
        severity,
        ..Default::default()
    }
}

#[test]
fn counts_totals_and_identified_threats() {
    let records = vec![
        LogRecord::from_raw("benign line"),
        threat(Some("port scan"), Some("1.1.1.1"), Some(Severity::Low)),
        threat(Some("port scan"), Some("2.2.2.2"), None),
        LogRecord::from_raw("another benign line"),
    ];
    let s = summarize(&records);
    assert_eq!(s.total_entries, 4);
    assert_eq!(s.identified_threats, 2);
    assert_eq!(s.unique_attackers.len(), 2);
    assert!(s.unique_targets.is_empty());
}

#[test]
fn attackers_accumulate_only_from_identified_threats() {
    let mut benign = LogRecord::from_raw("from 9.9.9.9");
    benign.attacker_ip = Some("9.9.9.9".to_string());
    let records = vec![benign, threat(Some("malware activity"), Some("1.1.1.1"), None)];
    let s = summarize(&records);
    assert_eq!(s.unique_attackers.iter().collect::<Vec<_>>(), vec!["1.1.1.1"]);
}

#[test]
fn threat_types_sort_by_count_with_first_seen_tie_break() {
    let records = vec![
        threat(Some("port scan"), None, None),
        threat(Some("firewall block"), None, None),
        threat(Some("malware activity"), None, None),
        threat(Some("malware activity"), None, None),
        threat(Some("firewall block"), None, None),
    ];
    let s = summarize(&records);
    let names: Vec<&str> = s.threat_types.iter().map(|(n, _)| n.as_str()).collect();
    // counts: malware 2, firewall 2, port scan 1; firewall was seen first
    assert_eq!(names, vec!["firewall block", "malware activity", "port scan"]);
    assert_eq!(s.threat_types[0].1, 2);
    assert_eq!(s.threat_types[2].1, 1);
}

#[test]
fn missing_threat_type_tallies_under_the_unknown_label() {
    let mut rec = LogRecord::from_raw("<script> in request");
    rec.threat_description = Some("cross-site scripting (XSS) attempt".to_string());
    rec.severity = Some(Severity::Medium);
    let s = summarize(&[rec]);
    assert_eq!(s.identified_threats, 1);
    assert_eq!(s.threat_types[0].0, UNKNOWN_THREAT_LABEL);
    assert_eq!(s.severity_counts.medium, 1);
}

#[test]
fn missing_severity_counts_as_unknown() {
    let s = summarize(&[threat(Some("port scan"), None, None)]);
    assert_eq!(s.severity_counts.unknown, 1);
    assert_eq!(s.severity_counts.high, 0);
}

#[test]
fn severity_buckets_tally_per_identified_threat() {
    let records = vec![
        threat(Some("a"), None, Some(Severity::High)),
        threat(Some("b"), None, Some(Severity::High)),
        threat(Some("c"), None, Some(Severity::Low)),
    ];
    let s = summarize(&records);
    assert_eq!(s.severity_counts.high, 2);
    assert_eq!(s.severity_counts.low, 1);
    assert_eq!(s.severity_counts.unknown, 0);
}

#[test]
fn empty_input_summarizes_to_zeroes() {
    let s = summarize(&[]);
    assert_eq!(s.total_entries, 0);
    assert_eq!(s.identified_threats, 0);
    assert!(s.threat_types.is_empty());
}

#[test]
fn alert_context_clamps_to_the_record_range() {
    let records: Vec<LogRecord> =
        (0..6).map(|i| LogRecord::from_raw(&format!("line {i}"))).collect();
    assert_eq!(alert_context(&records, 0, 2), "line 0\nline 1\nline 2");
    assert_eq!(alert_context(&records, 5, 2), "line 3\nline 4\nline 5");
    assert_eq!(alert_context(&records, 2, 1), "line 1\nline 2\nline 3");
}

#[test]
fn alert_context_past_the_end_is_empty() {
    let records: Vec<LogRecord> =
        (0..3).map(|i| LogRecord::from_raw(&format!("line {i}"))).collect();
    assert_eq!(alert_context(&records, 100, 5), "");
    assert_eq!(alert_context(&records, 3, 0), "");
}

#[test]
fn alert_context_renders_timestamped_records() {
    let records = vec![LogRecord::from_timestamped(
        "Jan 02 03:04:05".to_string(),
        "sshd: ready".to_string(),
    )];
    assert_eq!(alert_context(&records, 0, 5), "Jan 02 03:04:05 sshd: ready");
}
