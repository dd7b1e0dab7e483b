use std::io::{self, Write};

use tracing::warn;

/// Header size: 1 opcode byte + 4 length bytes.
pub const HEADER_SIZE: usize = 5;

/// A single framed record.
///
/// On-disk format:
/// ```text
/// [1 byte: opcode]
/// [4 bytes: payload length (little-endian u32)]
/// [N bytes: payload]
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Store-defined operation code.
    pub opcode: u8,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl Record {
    /// Total encoded size of this record, header included.
    pub fn encoded_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.payload.len() as u64
    }
}

/// Result of scanning a byte sequence for framed records.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// All fully-valid records, in file order.
    pub records: Vec<Record>,
    /// Byte offset one past the last fully-valid record.
    ///
    /// When this is less than the scanned length, everything from this
    /// offset onward is a corrupt tail (a torn trailing write).
    pub valid_len: u64,
}

/// Append one framed record to `buf`.
pub fn encode_record(buf: &mut Vec<u8>, opcode: u8, payload: &[u8]) {
    buf.push(opcode);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
}

/// Write one framed record to `w` as a single buffered write.
pub fn write_record<W: Write>(w: &mut W, opcode: u8, payload: &[u8]) -> io::Result<()> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    encode_record(&mut frame, opcode, payload);
    w.write_all(&frame)
}

/// Scan `data` front-to-back for framed records.
///
/// Scanning stops at the first header that does not fit in the remaining
/// bytes, or whose declared payload length exceeds them. A record is valid
/// only when the remaining bytes cover the declared length in full;
/// anything from the first failing record onward is a corrupt tail and is
/// excluded from `valid_len`. A corrupt tail is a warning, never an error.
pub fn scan(data: &[u8]) -> ScanOutcome {
    let mut records = Vec::new();
    let mut offset: usize = 0;

    while offset + HEADER_SIZE <= data.len() {
        let opcode = data[offset];
        let len = u32::from_le_bytes(
            data[offset + 1..offset + HEADER_SIZE]
                .try_into()
                .expect("header slice is 4 bytes"),
        ) as usize;

        let end = offset + HEADER_SIZE + len;
        if end > data.len() {
            warn!(
                offset,
                declared = len,
                remaining = data.len() - offset - HEADER_SIZE,
                "record length exceeds file; treating as corrupt tail"
            );
            break;
        }

        records.push(Record {
            opcode,
            payload: data[offset + HEADER_SIZE..end].to_vec(),
        });
        offset = end;
    }

    if offset < data.len() && offset + HEADER_SIZE > data.len() {
        warn!(
            offset,
            trailing = data.len() - offset,
            "trailing bytes too short for a record header; corrupt tail"
        );
    }

    ScanOutcome {
        records,
        valid_len: offset as u64,
    }
}
