// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use log::debug;

use super::{JamError, Source};
use crate::parser::{parse_crc, parse_note, parse_statement, Statement};
use crate::reader::StatementReader;

/// A key/value pair from a NOTE statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub key: String,
    pub value: String,
}

/// Read every NOTE statement in `source`, in file order.
///
/// Quoted keys keep their case; bare keys are upper case.
pub fn notes<S: Source + ?Sized>(source: &mut S) -> Result<Vec<Note>, JamError> {
    let mut reader = StatementReader::new();
    reader.rewind(source)?;
    let mut notes = Vec::new();
    loop {
        let raw = match reader.read_statement(source) {
            Ok(raw) => raw,
            Err(JamError::UnexpectedEnd) => break,
            Err(e) => return Err(e),
        };
        if let Ok(Statement::Note) = parse_statement(&raw.body) {
            let (key, value) = parse_note(&raw.body)?;
            debug!("NOTE {:?} = {:?}", key, value);
            notes.push(Note { key, value });
        }
    }
    Ok(notes)
}

/// Checksum of a program, from [`check_crc`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Crc {
    /// Value given by the CRC statement, if there is one.
    pub expected: Option<u16>,

    /// CRC of every byte before the CRC statement, or of the whole
    /// source if there is no CRC statement.
    pub actual: u16,
}

impl Crc {
    /// Fails with `CrcError` on a mismatch, or `UnexpectedEnd` if the
    /// program has no CRC statement.
    pub fn verify(&self) -> Result<(), JamError> {
        match self.expected {
            None => Err(JamError::UnexpectedEnd),
            Some(expected) if expected == self.actual => Ok(()),
            Some(_) => Err(JamError::CrcError),
        }
    }
}

/// Find the CRC statement in `source` and compute the CRC it should match.
///
/// The CRC is CRC-16/CCITT in its reflected form (polynomial 0x8408,
/// initial value 0xFFFF, result inverted), over every byte before the first
/// character of the CRC statement.
pub fn check_crc<S: Source + ?Sized>(source: &mut S) -> Result<Crc, JamError> {
    let mut reader = StatementReader::new();
    reader.rewind(source)?;
    let mut found = None;
    loop {
        let raw = match reader.read_statement(source) {
            Ok(raw) => raw,
            Err(JamError::UnexpectedEnd) => break,
            Err(e) => return Err(e),
        };
        if let Ok(Statement::Crc) = parse_statement(&raw.body) {
            found = Some((reader.statement_position(), parse_crc(&raw.body)?));
            break;
        }
    }

    source.seek(0)?;
    let mut crc = 0xFFFF;
    let mut position = 0;
    while found.map(|(end, _)| position < end).unwrap_or(true) {
        match source.read_byte() {
            Some(byte) => crc = crc16_update(crc, byte),
            None => break,
        }
        position += 1;
    }

    let crc = Crc { expected: found.map(|(_, expected)| expected), actual: !crc };
    debug!("CRC expected {:04X?}, computed {:04X}", crc.expected, crc.actual);
    Ok(crc)
}

fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ byte as u16;
    for _ in 0..8 {
        crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;

    fn crc_of(data: &[u8]) -> u16 {
        !data.iter().fold(0xFFFF, |crc, &b| crc16_update(crc, b))
    }

    #[test]
    fn test_crc16() {
        // CRC-16/X-25 check value.
        assert_eq!(crc_of(b"123456789"), 0x906E);
    }

    #[test]
    fn test_notes() {
        let program = b"NOTE \"CREATOR\" \"Some Tool\";\n' comment\nnote device \"EPM7064\";\n\
                        PRINT \"x\"; EXIT 0;";
        let mut src = MemorySource::new(program);
        assert_eq!(notes(&mut src), Ok(vec![
            Note { key: "CREATOR".to_string(), value: "Some Tool".to_string() },
            Note { key: "DEVICE".to_string(), value: "EPM7064".to_string() },
        ]));
        assert_eq!(notes(&mut MemorySource::new(b"")), Ok(vec![]));
        assert_eq!(notes(&mut MemorySource::new(b"NOTE \"X\";")), Err(JamError::SyntaxError));
    }

    #[test]
    fn test_check_crc() {
        let body = "NOTE \"A\" \"B\";\nEXIT 0;\n";
        let expected = crc_of(body.as_bytes());
        let program = format!("{}CRC {:04X};\n", body, expected);
        let crc = check_crc(&mut MemorySource::new(program.as_bytes())).unwrap();
        assert_eq!(crc, Crc { expected: Some(expected), actual: expected });
        assert_eq!(crc.verify(), Ok(()));

        let program = format!("{}CRC {:04X};\n", body, expected ^ 1);
        let crc = check_crc(&mut MemorySource::new(program.as_bytes())).unwrap();
        assert_eq!(crc.verify(), Err(JamError::CrcError));

        let crc = check_crc(&mut MemorySource::new(body.as_bytes())).unwrap();
        assert_eq!(crc.expected, None);
        assert_eq!(crc.actual, expected);
        assert_eq!(crc.verify(), Err(JamError::UnexpectedEnd));
    }
}
