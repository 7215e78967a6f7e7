use logveil::parser::{self, FormatHint};

#[test]
fn delimited_round_trips_for_every_supported_delimiter() {
    for delim in [',', ';', '\t', '|'] {
        let content = format!(
            "time{d}src{d}action\n09:00{d}1.2.3.4{d}allow\n09:01{d}5.6.7.8{d}deny\n",
            d = delim
        );
        let records = parser::parse_content(&content, FormatHint::Delimited, "test.csv")
            .expect("delimited parse");
        assert_eq!(records.len(), 2, "delimiter {delim:?}");
        for rec in &records {
            let fields = rec.fields.as_ref().expect("fields");
            assert_eq!(fields.len(), 3, "delimiter {delim:?}");
            assert!(fields.contains_key("action"));
        }
        assert_eq!(records[0].fields.as_ref().unwrap()["src"], "1.2.3.4");
        assert_eq!(records[1].fields.as_ref().unwrap()["action"], "deny");
    }
}

#[test]
fn delimited_short_rows_and_extra_cells() {
    let content = "a;b\n1;2\n3;4;5\n";
    let records =
        parser::parse_content(content, FormatHint::Delimited, "test.csv").expect("parse");
    assert_eq!(records.len(), 2);
    let extra = records[1].fields.as_ref().unwrap();
    assert_eq!(extra["col3"], "5");
}

#[test]
fn empty_delimited_file_is_a_structure_error() {
    let err = parser::parse_content("", FormatHint::Delimited, "empty.csv").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("empty.csv"), "error should carry the path: {msg}");
}

#[test]
fn missing_file_is_an_io_error_with_path() {
    let err = parser::parse_file(std::path::Path::new("/no/such/file.log")).unwrap_err();
    assert!(err.to_string().contains("/no/such/file.log"));
}

#[test]
fn empty_line_oriented_input_yields_no_records() {
    let records = parser::parse_lines("");
    assert!(records.is_empty());
}

#[test]
fn undetected_convention_gives_one_raw_record_per_line() {
    let content = "alpha\nbravo\ncharlie\n";
    let records = parser::parse_lines(content);
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].raw_text.as_deref(), Some("bravo"));
    assert!(records[1].timestamp.is_none());
    assert!(records[1].message.is_none());
}

#[test]
fn syslog_convention_detected_and_continuations_fold() {
    let content = "\
Jan 02 03:04:05 sshd: Failed password for root from 203.0.113.7 port 22
  retrying with keyboard-interactive
Jan 02 03:04:09 sshd: Connection closed
Feb 10 11:12:13 kernel: link up
";
    let records = parser::parse_lines(content);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].timestamp.as_deref(), Some("Jan 02 03:04:05"));
    assert_eq!(
        records[0].message.as_deref(),
        Some("sshd: Failed password for root from 203.0.113.7 port 22\n  retrying with keyboard-interactive")
    );
    assert_eq!(records[2].timestamp.as_deref(), Some("Feb 10 11:12:13"));
}

#[test]
fn iso_convention_wins_over_syslog_in_priority_order() {
    let content = "2023-01-01T12:34:56 server started\n2023-01-01T12:35:00 listening\n";
    let records = parser::parse_lines(content);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].timestamp.as_deref(), Some("2023-01-01T12:34:56"));
    assert_eq!(records[0].message.as_deref(), Some("server started"));
}

#[test]
fn spaced_convention_detected() {
    let content = "2023-05-06 07:08:09 warm-up done\n2023-05-06 07:08:10 ready\n";
    let records = parser::parse_lines(content);
    assert_eq!(records[1].timestamp.as_deref(), Some("2023-05-06 07:08:10"));
}

#[test]
fn apache_bracketed_convention_matches_mid_line() {
    let content = "\
192.0.2.1 - - [01/Jan/2023:12:34:56 +0000] \"GET / HTTP/1.1\" 200
192.0.2.2 - - [01/Jan/2023:12:34:57 +0000] \"GET /admin HTTP/1.1\" 403
";
    let records = parser::parse_lines(content);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].timestamp.as_deref(), Some("01/Jan/2023:12:34:56 +0000"));
    let msg = records[0].message.as_deref().unwrap();
    assert!(msg.contains("192.0.2.1"));
    assert!(msg.contains("\"GET / HTTP/1.1\" 200"));
    assert!(!msg.contains('['));
}

#[test]
fn convention_requires_all_of_the_first_ten_lines() {
    let mut lines: Vec<String> =
        (0..9).map(|i| format!("Jan 02 03:04:{i:02} entry {i}")).collect();
    lines.push("no timestamp here".to_string());
    lines.push("Jan 02 03:05:00 late entry".to_string());
    let records = parser::parse_lines(&lines.join("\n"));
    // line 10 broke detection, so every line is its own raw record
    assert_eq!(records.len(), 11);
    assert!(records.iter().all(|r| r.raw_text.is_some()));
}

#[test]
fn files_shorter_than_ten_lines_detect_on_all_available_lines() {
    let content = "Jan 02 03:04:05 sshd: Failed password for root from 203.0.113.7 port 22\n";
    let records = parser::parse_lines(content);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].timestamp.as_deref(), Some("Jan 02 03:04:05"));
    assert_eq!(
        records[0].message.as_deref(),
        Some("sshd: Failed password for root from 203.0.113.7 port 22")
    );
}

#[test]
fn record_count_equals_timestamp_matching_lines() {
    let content = "\
2024-03-01T00:00:01 job started
step one
step two
2024-03-01T00:00:05 job finished
";
    let records = parser::parse_lines(content);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].message.as_deref(), Some("job started\nstep one\nstep two"));
}
