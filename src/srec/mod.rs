//! Motorola S-record parsing.
//!
//! Only the 16-bit address family is understood: `S0` header, `S1` data, `S5` record count and
//! `S9` start address. Every record is checked for a correct byte count and checksum, and a single
//! bad record rejects the whole file.

use std::ops::Range;

use miette::SourceSpan;

use crate::error::{Defect, MalformedRecord};

use self::cursor::Cursor;

mod cursor;

/// Marks the start of every record.
pub const RECORD_MARKER: char = 'S';

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecordKind {
    /// `S0`, free-form header
    Header,
    /// `S1`, data at a 16-bit address
    Data,
    /// `S5`, count of preceding data records
    Count,
    /// `S9`, end of data and program start address
    Entry,
}

impl RecordKind {
    fn from_digit(digit: char) -> Option<RecordKind> {
        match digit {
            '0' => Some(RecordKind::Header),
            '1' => Some(RecordKind::Data),
            '5' => Some(RecordKind::Count),
            '9' => Some(RecordKind::Entry),
            _ => None,
        }
    }
}

/// A single validated record.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Record {
    pub kind: RecordKind,
    /// Address field followed by data, without count or checksum
    pub payload: Vec<u8>,
}

impl Record {
    /// Validate one record body: everything after the marker, line breaks removed.
    pub fn parse(body: &str) -> Result<Record, Defect> {
        let mut chars = body.chars();
        let digit = chars.next().ok_or(Defect::Empty)?;
        let kind = RecordKind::from_digit(digit).ok_or(Defect::UnsupportedType(digit))?;

        let fields = chars.as_str();
        if fields.len() % 2 != 0 {
            return Err(Defect::OddLength);
        }
        let mut cursor = Cursor::new(fields);
        let mut bytes = Vec::with_capacity(fields.len() / 2);
        while let Some(byte) = cursor.bump_byte().map_err(Defect::BadHexDigit)? {
            bytes.push(byte);
        }

        // Count, two address bytes and the checksum at the least
        let [declared, .., found] = bytes[..] else {
            return Err(Defect::TooShort);
        };
        let actual = bytes.len() - 1;
        if usize::from(declared) != actual {
            return Err(Defect::CountMismatch { declared, actual });
        }
        if actual < 3 {
            return Err(Defect::TooShort);
        }

        let expected = checksum(&bytes[..bytes.len() - 1]);
        if expected != found {
            return Err(Defect::ChecksumMismatch { expected, found });
        }

        bytes.pop();
        bytes.remove(0);
        Ok(Record {
            kind,
            payload: bytes,
        })
    }

    /// The address field as a 16-bit big-endian value.
    pub fn address(&self) -> u16 {
        u16::from_be_bytes([self.payload[0], self.payload[1]])
    }
}

/// One's complement of the low byte of the sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// Program image extracted from a record file.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct SrecImage {
    entry: u16,
    /// Data record payloads in file order
    payloads: Vec<Vec<u8>>,
}

impl SrecImage {
    pub fn new(entry: u16, payloads: Vec<Vec<u8>>) -> Self {
        SrecImage { entry, payloads }
    }

    /// Start address from the `S9` record, or `0x0000` if the file had none.
    pub fn entry(&self) -> u16 {
        self.entry
    }

    /// Each payload is a big-endian load address followed by the bytes to place there.
    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Total amount of data bytes across all payloads.
    pub fn data_len(&self) -> usize {
        self.payloads
            .iter()
            .map(|payload| payload.len().saturating_sub(2))
            .sum()
    }
}

/// Parse and validate a whole record file.
pub fn parse(src: &str) -> Result<SrecImage, MalformedRecord> {
    let mut image = SrecImage::default();
    let mut records = 0;

    for (index, span) in split_records(src).enumerate() {
        let body: String = src[span.start + 1..span.end]
            .chars()
            .filter(|&ch| ch != '\r' && ch != '\n')
            .collect();
        let record = Record::parse(&body).map_err(|defect| {
            let span = SourceSpan::from(span.start..trim_line_end(src, span.clone()));
            MalformedRecord::new(index, defect, src, span)
        })?;
        records += 1;

        match record.kind {
            RecordKind::Data => image.payloads.push(record.payload),
            RecordKind::Entry => image.entry = record.address(),
            RecordKind::Header | RecordKind::Count => {}
        }
    }

    tracing::debug!(
        records,
        payloads = image.payloads.len(),
        entry = image.entry,
        "parsed record file"
    );
    Ok(image)
}

/// Like [`parse`], but any validation failure yields an image with nothing to load.
pub fn parse_or_empty(src: &str) -> SrecImage {
    parse(src).unwrap_or_default()
}

/// Byte ranges of each record, marker included. Anything before the first marker is skipped.
fn split_records(src: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut starts = src.match_indices(RECORD_MARKER).map(|(i, _)| i).peekable();
    std::iter::from_fn(move || {
        let start = starts.next()?;
        let end = starts.peek().copied().unwrap_or(src.len());
        Some(start..end)
    })
}

fn trim_line_end(src: &str, span: Range<usize>) -> usize {
    span.start + src[span].trim_end_matches(['\r', '\n']).len()
}
