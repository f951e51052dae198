//! Child→parent result codec.
//!
//! The child serializes its result to stdout as a sequence of ASCII records,
//! each terminated by the 0x1F unit separator:
//!
//! ```text
//! status=<n> \x1f failure=<file>|<line>|<cond>|<expected>|<actual> \x1f ... end_of_data \x1f
//! ```
//!
//! String fields are escaped with `\`, which escapes itself and the `|`
//! field delimiter. Anything the test itself printed precedes the frame in
//! the same pipe; the parser locates the frame inside the combined buffer
//! and the whole buffer is kept as the test's captured output.
//!
//! The format assumes ordinary tests do not emit a literal 0x1F byte; tests
//! that print arbitrary binary data are outside the supported envelope.

use std::io::{self, Write};

use crate::result::{AssertionFailure, TestStatus};

/// Record separator on the wire (ASCII unit separator).
pub const RECORD_SEPARATOR: u8 = 0x1F;

/// Escape character inside string fields.
const ESCAPE: char = '\\';

/// Field delimiter inside `failure=` records.
const DELIMITER: char = '|';

/// Upper bound on a parsed field; longer fields are truncated, not rejected.
const MAX_FIELD_LEN: usize = 4096;

/// Escapes `\` and `|` in a string field.
pub fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        if ch == ESCAPE || ch == DELIMITER {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out
}

/// Reverses [`escape`]. A trailing lone escape character is dropped.
pub fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(ch) = chars.next() {
        if ch == ESCAPE {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Splits a `failure=` payload on unescaped delimiters, unescaping each
/// field as it goes.
fn split_fields(payload: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = payload.chars();
    while let Some(ch) = chars.next() {
        if ch == ESCAPE {
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if ch == DELIMITER {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    fields.push(current);
    fields
}

/// Writes the complete result frame for a finished child.
pub fn write_frame(
    writer: &mut impl Write,
    status: TestStatus,
    failures: &[AssertionFailure],
) -> io::Result<()> {
    write!(writer, "status={}", status.as_wire())?;
    writer.write_all(&[RECORD_SEPARATOR])?;
    for failure in failures {
        write!(
            writer,
            "failure={}|{}|{}|{}|{}",
            escape(&failure.file),
            failure.line,
            escape(&failure.condition),
            escape(&failure.expected),
            escape(&failure.actual),
        )?;
        writer.write_all(&[RECORD_SEPARATOR])?;
    }
    write!(writer, "end_of_data")?;
    writer.write_all(&[RECORD_SEPARATOR])?;
    writer.flush()
}

/// Outcome of parsing a captured output buffer.
#[derive(Debug, Default)]
pub struct ParsedFrame {
    /// The status the child reported, if a status record was found.
    pub status: Option<TestStatus>,
    /// Failure records in the order the child wrote them.
    pub failures: Vec<AssertionFailure>,
    /// Whether the closing `end_of_data` record was seen.
    pub complete: bool,
}

/// Parses the framed portion of a captured output buffer.
///
/// The parser is deliberately tolerant: the test's own stdout may share the
/// first segment with the status record, fields may be oversized (they are
/// truncated to a fixed cap), and a malformed or missing frame simply yields
/// an empty result with `status: None` so the caller can fall back to the
/// exit disposition.
pub fn parse_frame(buffer: &str) -> ParsedFrame {
    let mut frame = ParsedFrame::default();
    for segment in buffer.split(RECORD_SEPARATOR as char) {
        if frame.complete {
            break;
        }
        if segment == "end_of_data" {
            frame.complete = true;
        } else if let Some(payload) = segment.strip_prefix("failure=") {
            frame.failures.push(parse_failure(payload));
        } else if frame.status.is_none() {
            // The first framed record follows whatever the test printed,
            // with no separator in between; scan from the right.
            if let Some(at) = segment.rfind("status=") {
                if let Ok(value) = segment[at + "status=".len()..].trim().parse::<i32>() {
                    frame.status = TestStatus::from_wire(value);
                }
            }
        }
    }
    frame
}

fn parse_failure(payload: &str) -> AssertionFailure {
    let mut fields = split_fields(payload);
    fields.resize(5, String::new());
    for field in &mut fields {
        if field.len() > MAX_FIELD_LEN {
            field.truncate(MAX_FIELD_LEN);
        }
    }
    let mut fields = fields.into_iter();
    let file = fields.next().unwrap_or_default();
    let line = fields
        .next()
        .unwrap_or_default()
        .trim()
        .parse::<u32>()
        .unwrap_or(0);
    AssertionFailure {
        file,
        line,
        condition: fields.next().unwrap_or_default(),
        expected: fields.next().unwrap_or_default(),
        actual: fields.next().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(file: &str, line: u32, cond: &str, exp: &str, act: &str) -> AssertionFailure {
        AssertionFailure {
            file: file.into(),
            line,
            condition: cond.into(),
            expected: exp.into(),
            actual: act.into(),
        }
    }

    #[test]
    fn escape_round_trips_delimiters_and_backslashes() {
        let cases = [
            "",
            "plain text",
            "a|b",
            "a\\b",
            "|||",
            "\\\\",
            "mix|of\\both|and\\|more",
            "trailing\\",
            "unicode | ✓ \\ ∑",
        ];
        for case in cases {
            assert_eq!(unescape(&escape(case)), case, "case: {case:?}");
        }
    }

    #[test]
    fn escaped_fields_never_contain_a_bare_delimiter() {
        let escaped = escape("a|b\\c");
        let mut prev_was_escape = false;
        for ch in escaped.chars() {
            if ch == '|' {
                assert!(prev_was_escape);
            }
            prev_was_escape = ch == '\\' && !prev_was_escape;
        }
    }

    #[test]
    fn frame_round_trips_status_and_failures() {
        let failures = vec![
            failure("list.rs", 42, "size == 3", "3", "2"),
            failure("heap.rs", 7, "ptr|with|pipes", "a\\b", "c|d\\e"),
        ];
        let mut wire = Vec::new();
        write_frame(&mut wire, TestStatus::Failed, &failures).unwrap();

        let parsed = parse_frame(&String::from_utf8(wire).unwrap());
        assert_eq!(parsed.status, Some(TestStatus::Failed));
        assert!(parsed.complete);
        assert_eq!(parsed.failures, failures);
    }

    #[test]
    fn test_output_before_the_frame_is_tolerated() {
        let mut wire = Vec::new();
        write_frame(&mut wire, TestStatus::Passed, &[]).unwrap();
        let buffer = format!("hello world\n{}", String::from_utf8(wire).unwrap());

        let parsed = parse_frame(&buffer);
        assert_eq!(parsed.status, Some(TestStatus::Passed));
        assert!(parsed.complete);
        assert!(parsed.failures.is_empty());
    }

    #[test]
    fn malformed_frame_yields_no_status_and_no_failures() {
        let parsed = parse_frame("just some test output, no frame at all");
        assert_eq!(parsed.status, None);
        assert!(parsed.failures.is_empty());
        assert!(!parsed.complete);

        let parsed = parse_frame("status=notanumber\u{1f}end_of_data\u{1f}");
        assert_eq!(parsed.status, None);
        assert!(parsed.complete);
    }

    #[test]
    fn records_after_end_of_data_are_ignored() {
        let buffer = "status=1\u{1f}end_of_data\u{1f}failure=f|1|c|e|a\u{1f}";
        let parsed = parse_frame(buffer);
        assert_eq!(parsed.status, Some(TestStatus::Passed));
        assert!(parsed.failures.is_empty());
    }

    #[test]
    fn failure_order_is_preserved() {
        let failures: Vec<_> = (0..10)
            .map(|i| failure("f.rs", i, &format!("cond {i}"), "e", "a"))
            .collect();
        let mut wire = Vec::new();
        write_frame(&mut wire, TestStatus::Failed, &failures).unwrap();
        let parsed = parse_frame(&String::from_utf8(wire).unwrap());
        assert_eq!(parsed.failures, failures);
    }

    #[test]
    fn oversized_fields_are_truncated() {
        let huge = "x".repeat(MAX_FIELD_LEN * 2);
        let buffer = format!("status=2\u{1f}failure=f|1|{huge}|e|a\u{1f}end_of_data\u{1f}");
        let parsed = parse_frame(&buffer);
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].condition.len(), MAX_FIELD_LEN);
    }

    #[test]
    fn short_failure_records_are_padded() {
        let buffer = "status=2\u{1f}failure=only_file\u{1f}end_of_data\u{1f}";
        let parsed = parse_frame(buffer);
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].file, "only_file");
        assert_eq!(parsed.failures[0].line, 0);
        assert!(parsed.failures[0].condition.is_empty());
    }
}
