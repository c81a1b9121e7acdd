// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use std::io::{BufReader, Read, Seek, SeekFrom};

use log::trace;

use super::JamError;
use crate::symbol::MAX_NAME_LENGTH;

/// Longest statement kept, including its terminating semicolon.
/// Further characters are dropped.
pub const MAX_STATEMENT_LENGTH: usize = 1024;

/// Random-access byte stream holding a JAM program.
pub trait Source {
    /// Read the next byte, or None at the end of the stream.
    fn read_byte(&mut self) -> Option<u8>;

    /// Move to the absolute byte offset `offset`.
    fn seek(&mut self, offset: usize) -> Result<(), JamError>;
}

impl<S: Source + ?Sized> Source for &mut S {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }
    fn seek(&mut self, offset: usize) -> Result<(), JamError> {
        (**self).seek(offset)
    }
}

/// Program held in memory.
#[derive(Clone, Debug)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MemorySource { data, position: 0 }
    }
}

impl<'a> Source for MemorySource<'a> {
    fn read_byte(&mut self) -> Option<u8> {
        let b = self.data.get(self.position).copied();
        if b.is_some() {
            self.position += 1;
        }
        b
    }

    fn seek(&mut self, offset: usize) -> Result<(), JamError> {
        if offset > self.data.len() {
            return Err(JamError::IoError);
        }
        self.position = offset;
        Ok(())
    }
}

/// Program read from any seekable reader, such as a `File`.
///
/// A failed read is treated as the end of the stream.
#[derive(Debug)]
pub struct IoSource<R: Read + Seek> {
    inner: BufReader<R>,
}

impl<R: Read + Seek> IoSource<R> {
    pub fn new(reader: R) -> Self {
        IoSource { inner: BufReader::new(reader) }
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read + Seek> Source for IoSource<R> {
    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn seek(&mut self, offset: usize) -> Result<(), JamError> {
        self.inner.seek(SeekFrom::Start(offset as u64)).map_err(|_| JamError::IoError)?;
        Ok(())
    }
}

/// Statement text produced by [`StatementReader::read_statement`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawStatement {
    /// Label before the statement's colon, upper-cased, if any.
    pub label: Option<String>,

    /// Normalised statement text, ending in its semicolon.
    pub body: String,
}

/// Splits a [`Source`] into statements and tracks the offsets used for
/// control flow.
///
/// Comments are removed, tabs and line breaks become spaces, repeated and
/// leading spaces are dropped, and everything outside quoted strings and
/// Boolean array initialisers is converted to upper case.
#[derive(Clone, Debug, Default)]
pub struct StatementReader {
    current: usize,
    statement: usize,
    next: usize,
}

impl StatementReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the next byte to be read.
    pub fn current_position(&self) -> usize {
        self.current
    }

    /// Offset of the first character of the most recent statement.
    pub fn statement_position(&self) -> usize {
        self.statement
    }

    /// Offset just after the semicolon of the most recent statement.
    pub fn next_statement_position(&self) -> usize {
        self.next
    }

    /// Reset all offsets to the start of the stream and seek there.
    pub fn rewind<S: Source + ?Sized>(&mut self, src: &mut S) -> Result<(), JamError> {
        src.seek(0)?;
        self.current = 0;
        self.statement = 0;
        self.next = 0;
        Ok(())
    }

    /// Continue reading from `position`.
    pub fn seek<S: Source + ?Sized>(&mut self, src: &mut S, position: usize)
        -> Result<(), JamError>
    {
        src.seek(position)?;
        self.current = position;
        trace!("Seek to {}", position);
        Ok(())
    }

    /// Continue reading from `position`, which also becomes the statement
    /// position reported for errors.
    pub fn restart_at<S: Source + ?Sized>(&mut self, src: &mut S, position: usize)
        -> Result<(), JamError>
    {
        self.seek(src, position)?;
        self.statement = position;
        Ok(())
    }

    /// Read the next statement.
    ///
    /// Fails with `UnexpectedEnd` if the stream ends before a semicolon,
    /// `SyntaxError` for a second label, and `IllegalSymbol` for a label
    /// longer than the maximum name length.
    pub fn read_statement<S: Source + ?Sized>(&mut self, src: &mut S)
        -> Result<RawStatement, JamError>
    {
        let mut body = String::new();
        let mut label = None;
        let mut comment = false;
        let mut quoted = false;
        let mut boolean_data = false;
        let mut last = '\0';
        let mut position = self.current;
        let mut first_char = None;
        let mut result = Ok(());

        loop {
            let byte = src.read_byte();
            let mut c = byte.map(char::from).unwrap_or('\0');
            let mut opening_quote = false;

            if !comment && !quoted {
                match c {
                    '\'' => comment = true,
                    '"' => {
                        quoted = true;
                        opening_quote = true;
                    },
                    ':' if label.is_some() => {
                        result = Err(JamError::SyntaxError);
                        position += 1;
                        break;
                    },
                    ':' if body.len() > MAX_NAME_LENGTH => {
                        result = Err(JamError::IllegalSymbol);
                        position += 1;
                        break;
                    },
                    ':' => {
                        label = Some(body.trim_end().to_string());
                        body.clear();
                        first_char = None;
                        c = ' ';
                    },
                    '\t' | '\r' | '\n' => c = ' ',
                    _ => (),
                }
            }

            if byte.is_none() {
                result = Err(JamError::UnexpectedEnd);
                position += 1;
                break;
            }

            let keep = !comment
                && body.len() < MAX_STATEMENT_LENGTH
                && (first_char.is_some() || c != ' ')
                && (quoted || c != ' ' || last != ' ');
            if keep {
                if quoted || boolean_data {
                    body.push(c);
                } else {
                    body.push(c.to_ascii_uppercase());
                }
                if first_char.is_none() {
                    first_char = Some(position);
                }
                if !boolean_data && c == ']' && body.starts_with("BOOLEAN") {
                    boolean_data = true;
                }
            }

            let end = !comment && !quoted && c == ';';
            if comment && (c == '\n' || c == '\r') {
                comment = false;
            } else if quoted && c == '"' && !opening_quote {
                quoted = false;
            }

            last = c;
            position += 1;
            if end {
                self.next = position;
                break;
            }
        }

        self.current = position;
        if let Some(first) = first_char {
            self.statement = first;
        }
        trace!("Read statement at {}, next at {}", self.statement, self.next);
        result.map(|_| RawStatement { label, body })
    }
}

/// Line number, starting from 1, of byte offset `position` in `src`.
pub fn line_of_position<S: Source + ?Sized>(src: &mut S, position: usize)
    -> Result<usize, JamError>
{
    src.seek(0)?;
    let mut buf = Vec::with_capacity(position);
    while buf.len() < position {
        match src.read_byte() {
            Some(b) => buf.push(b),
            None => break,
        }
    }
    Ok(bytecount::count(&buf, b'\n') + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Read every statement body from `text`.
    fn bodies(text: &str) -> Vec<String> {
        let mut src = MemorySource::new(text.as_bytes());
        let mut reader = StatementReader::new();
        let mut out = Vec::new();
        while let Ok(st) = reader.read_statement(&mut src) {
            out.push(st.body);
        }
        out
    }

    #[test]
    fn test_normalise() {
        assert_eq!(bodies("  let\ta  =  b ;\r\n"), vec!["LET A = B ;"]);
        assert_eq!(bodies("print \"Mixed  Case\";"), vec!["PRINT \"Mixed  Case\";"]);
        assert_eq!(bodies("a;b;\n c ;"), vec!["A;", "B;", "C ;"]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(bodies("'comment; here\nexit 0; ' trailing"), vec!["EXIT 0;"]);
        assert_eq!(bodies("print \"it's\"; 'x\r"), vec!["PRINT \"it's\";"]);
        assert_eq!(bodies("print \"a;b\";"), vec!["PRINT \"a;b\";"]);
    }

    #[test]
    fn test_boolean_data_case() {
        assert_eq!(bodies("boolean x[8] = $a5;"), vec!["BOOLEAN X[8] = $a5;"]);
        assert_eq!(bodies("boolean x = 1 & y[0];"), vec!["BOOLEAN X = 1 & Y[0];"]);
        assert_eq!(bodies("drscan 8, x[7..0];"), vec!["DRSCAN 8, X[7..0];"]);
    }

    #[test]
    fn test_labels() {
        let text = "start :  goto start;\nl2:exit 1;";
        let mut src = MemorySource::new(text.as_bytes());
        let mut reader = StatementReader::new();
        let st = reader.read_statement(&mut src).unwrap();
        assert_eq!(st.label.as_deref(), Some("START"));
        assert_eq!(st.body, "GOTO START;");
        assert_eq!(reader.statement_position(), 9);
        assert_eq!(reader.next_statement_position(), 20);
        assert_eq!(reader.current_position(), 20);
        let st = reader.read_statement(&mut src).unwrap();
        assert_eq!(st.label.as_deref(), Some("L2"));
        assert_eq!(reader.statement_position(), 24);
        assert_eq!(reader.read_statement(&mut src), Err(JamError::UnexpectedEnd));
    }

    #[test]
    fn test_label_errors() {
        let mut src = MemorySource::new(b"a: b: exit 0;");
        let mut reader = StatementReader::new();
        assert_eq!(reader.read_statement(&mut src), Err(JamError::SyntaxError));

        let text = format!("{}: exit 0;", "L".repeat(33));
        let mut src = MemorySource::new(text.as_bytes());
        let mut reader = StatementReader::new();
        assert_eq!(reader.read_statement(&mut src), Err(JamError::IllegalSymbol));
    }

    #[test]
    fn test_long_statement_truncated() {
        let text = format!("print \"{}\";", "x".repeat(2000));
        let body = &bodies(&text)[0];
        assert_eq!(body.len(), MAX_STATEMENT_LENGTH);
    }

    #[test]
    fn test_seek() {
        let text = b"a; b; c;";
        let mut src = MemorySource::new(text);
        let mut reader = StatementReader::new();
        reader.read_statement(&mut src).unwrap();
        reader.read_statement(&mut src).unwrap();
        reader.seek(&mut src, 0).unwrap();
        assert_eq!(reader.read_statement(&mut src).unwrap().body, "A;");
        assert_eq!(reader.seek(&mut src, 100), Err(JamError::IoError));
    }

    #[test]
    fn test_io_source() {
        let mut src = IoSource::new(std::io::Cursor::new(b"exit 3;".to_vec()));
        let mut reader = StatementReader::new();
        assert_eq!(reader.read_statement(&mut src).unwrap().body, "EXIT 3;");
        reader.rewind(&mut src).unwrap();
        assert_eq!(reader.read_statement(&mut src).unwrap().body, "EXIT 3;");
    }

    #[test]
    fn test_line_of_position() {
        let mut src = MemorySource::new(b"a;\nb;\n\nc;");
        assert_eq!(line_of_position(&mut src, 0), Ok(1));
        assert_eq!(line_of_position(&mut src, 3), Ok(2));
        assert_eq!(line_of_position(&mut src, 7), Ok(4));
    }
}
