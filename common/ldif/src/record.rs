use std::io::{self, BufRead, Write};

use base64::prelude::*;
use thiserror::Error;

use crate::dn::Dn;
use crate::entry::{Attribute, Entry};

/// A malformed source record. Carries the raw record text so it can be
/// forwarded to an errors sink verbatim.
#[derive(Debug, Error, Clone)]
#[error("record at line {line}: {message}")]
pub struct RecordParseError {
    pub line: usize,
    pub message: String,
    pub raw: String,
}

/// One blank-line-delimited group of logical lines, continuation lines already
/// folded, comments stripped.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub first_line: usize,
    pub lines: Vec<String>,
}

impl RawRecord {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    fn error(&self, message: impl Into<String>) -> RecordParseError {
        RecordParseError {
            line: self.first_line,
            message: message.into(),
            raw: self.text(),
        }
    }

    pub fn parse(&self) -> Result<Entry, RecordParseError> {
        let Some(dn_line) = self.lines.first() else {
            return Err(self.error("empty record"));
        };
        // `get` instead of slicing: the first line may start mid-way into a
        // multibyte character and must parse-fail, not panic.
        if !dn_line.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("dn")) {
            return Err(self.error("record does not start with a dn line"));
        }
        let dn_value = parse_line_value(&dn_line[2..])
            .map_err(|e| self.error(format!("bad dn line: {e}")))?;
        let dn = Dn::parse(&dn_value).map_err(|e| self.error(format!("bad dn: {e}")))?;

        let mut attributes: Vec<Attribute> = Vec::new();
        for line in &self.lines[1..] {
            let Some(colon) = line.find(':') else {
                return Err(self.error(format!("attribute line has no ':': {line}")));
            };
            let name = line[..colon].trim();
            if name.is_empty() {
                return Err(self.error(format!("attribute line has no name: {line}")));
            }
            let value = parse_line_value(&line[colon..])
                .map_err(|e| self.error(format!("bad value for {name}: {e}")))?;

            match attributes
                .iter_mut()
                .find(|a| a.name.eq_ignore_ascii_case(name))
            {
                Some(attr) => attr.values.push(value),
                None => attributes.push(Attribute {
                    name: name.to_string(),
                    values: vec![value],
                }),
            }
        }

        Ok(Entry::new(dn, attributes))
    }
}

// Input is the line from the ':' onward. "): value", ":: base64", ":< url".
fn parse_line_value(rest: &str) -> Result<String, String> {
    let rest = rest.strip_prefix(':').ok_or("missing ':'")?;
    if let Some(b64) = rest.strip_prefix(':') {
        let decoded = BASE64_STANDARD
            .decode(b64.trim())
            .map_err(|e| format!("invalid base64: {e}"))?;
        // Lossy conversion would re-encode replacement characters on the
        // write side and the shard would no longer carry the input bytes.
        String::from_utf8(decoded).map_err(|_| "base64 value is not valid UTF-8".to_string())
    } else if rest.starts_with('<') {
        Err("file URL values are not supported".to_string())
    } else {
        Ok(rest.strip_prefix(' ').unwrap_or(rest).to_string())
    }
}

/// Streaming reader for blank-line-delimited LDIF records. Folds continuation
/// lines, skips comments and a leading `version:` header, and never fails on
/// record content (content problems surface from `RawRecord::parse`).
pub struct RecordReader<R: BufRead> {
    reader: R,
    line_no: usize,
    at_start: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            at_start: true,
        }
    }

    /// The next record, or None at end of stream. Errors are I/O only.
    pub fn next_record(&mut self) -> io::Result<Option<RawRecord>> {
        let mut lines: Vec<String> = Vec::new();
        let mut first_line = 0;
        // Whether the previous physical line was dropped, so its continuation
        // lines must be dropped too.
        let mut last_dropped = false;

        loop {
            let mut buf = String::new();
            let n = self.reader.read_line(&mut buf)?;
            if n == 0 {
                return Ok(if lines.is_empty() {
                    None
                } else {
                    Some(RawRecord { first_line, lines })
                });
            }
            self.line_no += 1;
            let line = buf.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !lines.is_empty() {
                    return Ok(Some(RawRecord { first_line, lines }));
                }
                continue;
            }

            if let Some(cont) = line.strip_prefix(' ') {
                if last_dropped {
                    continue;
                }
                match lines.last_mut() {
                    Some(last) => last.push_str(cont),
                    // A continuation with nothing to continue; keep it as its
                    // own line and let parsing report the record as malformed.
                    None => {
                        first_line = self.line_no;
                        lines.push(cont.to_string());
                    }
                }
                continue;
            }

            if line.starts_with('#') {
                last_dropped = true;
                continue;
            }
            if self.at_start && lines.is_empty() && line.to_ascii_lowercase().starts_with("version:")
            {
                last_dropped = true;
                self.at_start = false;
                continue;
            }
            self.at_start = false;
            last_dropped = false;

            if lines.is_empty() {
                first_line = self.line_no;
            }
            lines.push(line.to_string());
        }
    }
}

// A value can go on the line verbatim only if it is ASCII, has no control
// characters, and does not start with a character LDIF reserves.
fn is_safe_value(value: &str) -> bool {
    if value.starts_with([' ', ':', '<']) || value.ends_with(' ') {
        return false;
    }
    value
        .bytes()
        .all(|b| (0x20..=0x7e).contains(&b))
}

fn write_line<W: Write>(w: &mut W, name: &str, value: &str) -> io::Result<()> {
    if is_safe_value(value) {
        writeln!(w, "{name}: {value}")
    } else {
        writeln!(w, "{name}:: {}", BASE64_STANDARD.encode(value.as_bytes()))
    }
}

/// Writes one entry as an LDIF record followed by a blank line.
pub fn write_entry<W: Write>(w: &mut W, entry: &Entry) -> io::Result<()> {
    write_line(w, "dn", entry.dn().raw())?;
    for attr in entry.attributes() {
        for value in &attr.values {
            write_line(w, &attr.name, value)?;
        }
    }
    writeln!(w)
}

/// Writes a raw record back out verbatim, followed by a blank line. Used for
/// sinks that must preserve malformed input.
pub fn write_raw<W: Write>(w: &mut W, record: &RawRecord) -> io::Result<()> {
    for line in &record.lines {
        writeln!(w, "{line}")?;
    }
    writeln!(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(input: &str) -> Vec<RawRecord> {
        let mut reader = RecordReader::new(Cursor::new(input.to_string()));
        let mut records = Vec::new();
        while let Some(r) = reader.next_record().unwrap() {
            records.push(r);
        }
        records
    }

    #[test]
    fn test_reads_blank_line_delimited_records() {
        let records = read_all(
            "dn: dc=example,dc=com\nobjectClass: domain\n\n\ndn: ou=People,dc=example,dc=com\nou: People\n",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lines.len(), 2);
        assert_eq!(records[1].first_line, 5);
    }

    #[test]
    fn test_folds_continuation_lines() {
        let records = read_all("dn: uid=jdoe,dc=exa\n mple,dc=com\ncn: Jane\n");
        assert_eq!(records[0].lines[0], "dn: uid=jdoe,dc=example,dc=com");
    }

    #[test]
    fn test_skips_comments_and_version_header() {
        let records = read_all(
            "version: 1\n# exported 2024-01-01\n# continued comment\n line\ndn: dc=example,dc=com\ndc: example\n",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].lines[0], "dn: dc=example,dc=com");
    }

    #[test]
    fn test_parse_entry_with_base64_value() {
        let records = read_all("dn: uid=jdoe,dc=example,dc=com\ncn:: SmFuZSBEb2U=\ncn: J. Doe\n");
        let entry = records[0].parse().unwrap();
        assert_eq!(entry.values("cn"), vec!["Jane Doe", "J. Doe"]);
    }

    #[test]
    fn test_parse_rejects_missing_dn() {
        let records = read_all("cn: no dn here\nsn: nope\n");
        let err = records[0].parse().unwrap_err();
        assert!(err.message.contains("dn"));
        assert_eq!(err.raw, "cn: no dn here\nsn: nope");
    }

    #[test]
    fn test_parse_rejects_multibyte_first_line() {
        let records = read_all("€uro: value\nsn: nope\n");
        let err = records[0].parse().unwrap_err();
        assert!(err.message.contains("dn"));
        assert_eq!(err.raw, "€uro: value\nsn: nope");
    }

    #[test]
    fn test_parse_rejects_non_utf8_base64_value() {
        // 0xFF 0xFE is not valid UTF-8.
        let records = read_all("dn: uid=jdoe,dc=example,dc=com\nuserCertificate:: //4=\n");
        let err = records[0].parse().unwrap_err();
        assert!(err.message.contains("UTF-8"));
        assert_eq!(err.raw, "dn: uid=jdoe,dc=example,dc=com\nuserCertificate:: //4=");
    }

    #[test]
    fn test_parse_rejects_garbage_attribute_line() {
        let records = read_all("dn: dc=example,dc=com\nthis is not an attribute\n");
        assert!(records[0].parse().is_err());
    }

    #[test]
    fn test_write_entry_round_trips() {
        let records = read_all("dn: uid=jdoe,dc=example,dc=com\ncn: Jane Doe\ndescription: a: b\n");
        let entry = records[0].parse().unwrap();

        let mut out = Vec::new();
        write_entry(&mut out, &entry).unwrap();
        let text = String::from_utf8(out).unwrap();

        let reparsed = read_all(&text)[0].parse().unwrap();
        assert_eq!(reparsed, entry);
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_write_encodes_unsafe_values() {
        let entry = Entry::new(
            Dn::parse("dc=example,dc=com").unwrap(),
            vec![Attribute {
                name: "description".to_string(),
                values: vec![" leading space".to_string()],
            }],
        );
        let mut out = Vec::new();
        write_entry(&mut out, &entry).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("description:: "));
    }
}
