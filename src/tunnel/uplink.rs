//! Uplink payload decoding and byte-count acknowledgments.

use data_encoding::BASE32_NOPAD;

use super::answer::{AnswerData, AnswerKind};

/// Decodes a case-insensitive base32 uplink payload.
///
/// Label separators and `=` padding are ignored.
pub fn decode_payload(encoded: &str) -> std::io::Result<Vec<u8>> {
    let normalized: Vec<u8> = encoded
        .bytes()
        .filter(|c| *c != b'.' && *c != b'=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    BASE32_NOPAD.decode(&normalized).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid base32 uplink payload: {e}"),
        )
    })
}

/// Adds `written` bytes to the running total, modulo 2^32.
#[inline]
pub fn advance_total(total: u32, written: usize) -> u32 {
    total.wrapping_add(written as u32)
}

/// The 4-byte big-endian acknowledgment of `total`, shaped for `kind`.
pub fn ack(kind: AnswerKind, total: u32) -> AnswerData {
    let ack = total.to_be_bytes().to_vec();
    match kind {
        AnswerKind::Txt => AnswerData::Strings(vec![ack]),
        AnswerKind::Null => AnswerData::Blob(ack),
        AnswerKind::Cname => AnswerData::Labels(vec![ack]),
    }
}
