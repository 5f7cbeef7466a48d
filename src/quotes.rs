//! Strict quote checking for delimited input
//!
//! The csv reader accepts a quoted field that never closes (swallowing the
//! rest of the file into it) and a `"` inside an unquoted field. Both mean
//! the file is malformed, so the loader reads through [`QuoteValidator`],
//! which fails the read with a [`MalformedQuote`] instead.

use std::io::{self, Read};
use thiserror::Error;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Quoting violation found while reading, with the 1-based line it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MalformedQuote {
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    /// Inside a quoted field opened on the given line
    Quoted(u64),
    /// Just read a `"` inside a quoted field: either an escape or the close
    QuoteInQuoted(u64),
}

/// Pass-through reader that tracks RFC 4180 quoting across reads
pub struct QuoteValidator<R> {
    inner: R,
    delimiter: u8,
    state: State,
    line: u64,
    /// Leading bytes matched against the UTF-8 byte order mark
    bom_matched: usize,
    at_start: bool,
}

impl<R: Read> QuoteValidator<R> {
    pub fn new(inner: R, delimiter: u8) -> Self {
        Self {
            inner,
            delimiter,
            state: State::FieldStart,
            line: 1,
            bom_matched: 0,
            at_start: true,
        }
    }

    fn scan(&mut self, bytes: &[u8]) -> Result<(), MalformedQuote> {
        for &byte in bytes {
            if self.at_start {
                if self.bom_matched < UTF8_BOM.len() && byte == UTF8_BOM[self.bom_matched] {
                    self.bom_matched += 1;
                    if self.bom_matched == UTF8_BOM.len() {
                        self.at_start = false;
                    }
                    continue;
                }
                self.at_start = false;
                // A partial mark is ordinary field content
                if self.bom_matched > 0 {
                    self.state = State::Unquoted;
                }
            }
            self.step(byte)?;
        }
        Ok(())
    }

    fn step(&mut self, byte: u8) -> Result<(), MalformedQuote> {
        let ends_field = byte == self.delimiter || byte == b'\n' || byte == b'\r';
        self.state = match self.state {
            State::FieldStart | State::Unquoted if ends_field => State::FieldStart,
            State::FieldStart if byte == b'"' => State::Quoted(self.line),
            State::FieldStart | State::Unquoted if byte == b'"' => {
                return Err(self.violation("quote inside an unquoted field"));
            }
            State::FieldStart | State::Unquoted => State::Unquoted,
            State::Quoted(opened) if byte == b'"' => State::QuoteInQuoted(opened),
            State::Quoted(opened) => State::Quoted(opened),
            State::QuoteInQuoted(opened) if byte == b'"' => State::Quoted(opened),
            State::QuoteInQuoted(_) if ends_field => State::FieldStart,
            State::QuoteInQuoted(_) => {
                return Err(self.violation("unexpected character after closing quote"));
            }
        };
        if byte == b'\n' {
            self.line += 1;
        }
        Ok(())
    }

    fn finish(&self) -> Result<(), MalformedQuote> {
        match self.state {
            State::Quoted(opened) => Err(MalformedQuote {
                line: opened,
                message: "unterminated quoted field".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn violation(&self, message: &str) -> MalformedQuote {
        MalformedQuote {
            line: self.line,
            message: message.to_string(),
        }
    }
}

impl<R: Read> Read for QuoteValidator<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let checked = if n == 0 {
            self.finish()
        } else {
            self.scan(&buf[..n])
        };
        checked.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(n)
    }
}

/// The quoting violation carried by an I/O error, if any
pub fn malformed_quote(error: &io::Error) -> Option<&MalformedQuote> {
    error.get_ref()?.downcast_ref::<MalformedQuote>()
}
