//! Minimal RFC 4180 record reader and writer.
//!
//! Fields are separated by commas and quoted with `"` when they contain a comma, a
//! quote or a line break. Quoted fields may span lines; `""` inside quotes is a
//! literal quote.

use std::borrow::Cow;
use std::io::{self, BufRead, Write};

use crate::error::{RedirectError, Result};

/// Reads CSV records one at a time.
pub struct CsvReader<R> {
    inner: R,
    line: usize,
}

impl<R: BufRead> CsvReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, line: 0 }
    }

    /// 1-based number of the last line read
    pub fn line(&self) -> usize {
        self.line
    }

    /// Read the next record. Blank lines are skipped.
    pub fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                continue;
            }
            return self.parse_record(line).map(Some);
        }
        Ok(None)
    }

    /// Read one line. A line that is not valid UTF-8 is consumed and reported as
    /// `Csv`, so the next call continues with the following line.
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if self.inner.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;

        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|e| RedirectError::Csv {
                line: self.line,
                message: e.to_string(),
            })
    }

    fn parse_record(&mut self, first: String) -> Result<Vec<String>> {
        let start_line = self.line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut at_field_start = true;
        let mut line = first;

        loop {
            let mut chars = line.chars().peekable();
            while let Some(c) = chars.next() {
                if in_quotes {
                    if c != '"' {
                        field.push(c);
                    } else if chars.peek() == Some(&'"') {
                        field.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                    continue;
                }
                match c {
                    ',' => {
                        fields.push(std::mem::take(&mut field));
                        at_field_start = true;
                        continue;
                    }
                    '"' if at_field_start => in_quotes = true,
                    _ => field.push(c),
                }
                at_field_start = false;
            }

            if !in_quotes {
                break;
            }
            // Quoted field continues on the next line
            match self.read_line()? {
                Some(next) => {
                    field.push('\n');
                    line = next;
                }
                None => {
                    return Err(RedirectError::Csv {
                        line: start_line,
                        message: "unterminated quoted field".to_string(),
                    })
                }
            }
        }

        fields.push(field);
        Ok(fields)
    }
}

/// Quote a field if it needs it.
pub fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\r' | '\n')) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Write one record terminated by `\n`.
pub fn write_record<W: Write>(out: &mut W, fields: &[&str]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        out.write_all(quote_field(field).as_bytes())?;
    }
    out.write_all(b"\n")
}
