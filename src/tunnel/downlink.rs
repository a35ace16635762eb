//! Downlink chunking: how much queued backend data one poll response carries,
//! and how it is encoded for each record type.
//!
//! | record | bytes per response | encoding |
//! |--------|--------------------|----------|
//! | TXT    | 220, else 110, else all | base64 per 110-byte segment, one string each |
//! | NULL   | up to 220          | base64, single blob |
//! | CNAME  | up to 110          | base32, split into 63-character labels |

use base64::engine::{Engine as _, general_purpose::STANDARD};
use data_encoding::BASE32_NOPAD;

use super::answer::{AnswerData, AnswerKind};
use super::pending::PendingDownlink;

/// Raw bytes carried by one TXT string.
pub const SEGMENT_SIZE: usize = 110;

pub const TXT_MAX_BYTES: usize = 2 * SEGMENT_SIZE;

pub const NULL_MAX_BYTES: usize = 2 * SEGMENT_SIZE;

pub const CNAME_MAX_BYTES: usize = SEGMENT_SIZE;

pub const MAX_LABEL_LENGTH: usize = 63;

/// Takes the next chunk off `pending` and encodes it for `kind`.
///
/// An empty queue yields the kind's empty answer: one empty string, an empty
/// blob, or the root name.
pub fn next_chunk(
    kind: AnswerKind,
    pending: &mut PendingDownlink,
    max_name_length: usize,
) -> AnswerData {
    match kind {
        AnswerKind::Txt => {
            let chunk = pending.take(txt_chunk_size(pending.len()));
            if chunk.is_empty() {
                return AnswerData::Strings(vec![Vec::new()]);
            }
            AnswerData::Strings(
                chunk
                    .chunks(SEGMENT_SIZE)
                    .map(|segment| STANDARD.encode(segment).into_bytes())
                    .collect(),
            )
        }
        AnswerKind::Null => {
            let chunk = pending.take(NULL_MAX_BYTES);
            AnswerData::Blob(STANDARD.encode(&chunk).into_bytes())
        }
        AnswerKind::Cname => {
            let chunk = pending.take(cname_chunk_size(max_name_length));
            AnswerData::Labels(encode_labels(&chunk))
        }
    }
}

/// TXT answers carry two full segments, one full segment, or a short tail.
fn txt_chunk_size(available: usize) -> usize {
    if available >= TXT_MAX_BYTES {
        TXT_MAX_BYTES
    } else if available >= SEGMENT_SIZE {
        SEGMENT_SIZE
    } else {
        available
    }
}

/// Largest raw chunk whose encoded CNAME fits within `max_name_length`.
pub fn cname_chunk_size(max_name_length: usize) -> usize {
    let mut size = CNAME_MAX_BYTES;
    while size > 0 && encoded_name_length(size) > max_name_length {
        size -= 1;
    }
    size
}

/// Presentation length of the name carrying `raw_len` bytes, dots included.
fn encoded_name_length(raw_len: usize) -> usize {
    let chars = BASE32_NOPAD.encode_len(raw_len);
    if chars == 0 {
        return 0;
    }
    chars + (chars - 1) / MAX_LABEL_LENGTH
}

/// Base32-encodes `chunk` and wraps it every [`MAX_LABEL_LENGTH`] characters.
pub fn encode_labels(chunk: &[u8]) -> Vec<Vec<u8>> {
    let encoded = BASE32_NOPAD.encode(chunk);
    encoded
        .as_bytes()
        .chunks(MAX_LABEL_LENGTH)
        .map(<[u8]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_NAME_LENGTH;

    fn pending_with(len: usize) -> (PendingDownlink, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut pending = PendingDownlink::new();
        pending.push(&data);
        (pending, data)
    }

    fn decode_strings(data: &AnswerData) -> Vec<Vec<u8>> {
        let AnswerData::Strings(strings) = data else {
            panic!("expected strings, got {data:?}");
        };
        strings
            .iter()
            .map(|s| STANDARD.decode(s).unwrap())
            .collect()
    }

    fn decode_labels(data: &AnswerData) -> Vec<u8> {
        let AnswerData::Labels(labels) = data else {
            panic!("expected labels, got {data:?}");
        };
        let joined: Vec<u8> = labels.concat();
        BASE32_NOPAD.decode(&joined).unwrap()
    }

    #[test]
    fn test_txt_two_segments_then_tail() {
        let (mut pending, data) = pending_with(250);

        let first = next_chunk(AnswerKind::Txt, &mut pending, DEFAULT_MAX_NAME_LENGTH);
        let segments = decode_strings(&first);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], &data[..110]);
        assert_eq!(segments[1], &data[110..220]);
        assert_eq!(pending.len(), 30);

        let second = next_chunk(AnswerKind::Txt, &mut pending, DEFAULT_MAX_NAME_LENGTH);
        assert_eq!(decode_strings(&second), vec![data[220..].to_vec()]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_txt_exactly_two_segments() {
        let (mut pending, data) = pending_with(220);
        let chunk = next_chunk(AnswerKind::Txt, &mut pending, DEFAULT_MAX_NAME_LENGTH);
        assert_eq!(decode_strings(&chunk).concat(), data);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_txt_between_one_and_two_segments_sends_one() {
        let (mut pending, data) = pending_with(200);

        let chunk = next_chunk(AnswerKind::Txt, &mut pending, DEFAULT_MAX_NAME_LENGTH);
        assert_eq!(decode_strings(&chunk), vec![data[..110].to_vec()]);
        assert_eq!(&pending.take(usize::MAX)[..], &data[110..]);
    }

    #[test]
    fn test_txt_short_tail_sent_whole() {
        let (mut pending, data) = pending_with(42);
        let chunk = next_chunk(AnswerKind::Txt, &mut pending, DEFAULT_MAX_NAME_LENGTH);
        assert_eq!(decode_strings(&chunk), vec![data]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_null_single_blob() {
        let (mut pending, data) = pending_with(300);

        let AnswerData::Blob(blob) =
            next_chunk(AnswerKind::Null, &mut pending, DEFAULT_MAX_NAME_LENGTH)
        else {
            panic!("expected blob");
        };
        assert_eq!(STANDARD.decode(&blob).unwrap(), &data[..220]);
        assert_eq!(pending.len(), 80);

        let AnswerData::Blob(blob) =
            next_chunk(AnswerKind::Null, &mut pending, DEFAULT_MAX_NAME_LENGTH)
        else {
            panic!("expected blob");
        };
        assert_eq!(STANDARD.decode(&blob).unwrap(), &data[220..]);
    }

    #[test]
    fn test_cname_labels() {
        let (mut pending, data) = pending_with(150);

        let chunk = next_chunk(AnswerKind::Cname, &mut pending, DEFAULT_MAX_NAME_LENGTH);
        let AnswerData::Labels(labels) = &chunk else {
            panic!("expected labels");
        };
        // 110 bytes encode to 176 base32 characters.
        assert_eq!(
            labels.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![63, 63, 50]
        );
        assert_eq!(decode_labels(&chunk), &data[..110]);
        assert_eq!(pending.len(), 40);
    }

    #[test]
    fn test_cname_short_chunk_is_one_label() {
        let (mut pending, data) = pending_with(20);
        let chunk = next_chunk(AnswerKind::Cname, &mut pending, DEFAULT_MAX_NAME_LENGTH);
        let AnswerData::Labels(labels) = &chunk else {
            panic!("expected labels");
        };
        assert_eq!(labels.len(), 1);
        assert_eq!(decode_labels(&chunk), data);
    }

    #[test]
    fn test_cname_chunk_size_respects_name_limit() {
        assert_eq!(cname_chunk_size(253), 110);
        assert_eq!(cname_chunk_size(178), 110);
        assert!(cname_chunk_size(177) < 110);
        // 39 bytes are 63 characters, a single label.
        assert_eq!(cname_chunk_size(64), 39);

        for limit in [64, 100, 128, 177, 253] {
            assert!(encoded_name_length(cname_chunk_size(limit)) <= limit);
        }
    }

    #[test]
    fn test_empty_queue_answers() {
        let mut pending = PendingDownlink::new();
        assert_eq!(
            next_chunk(AnswerKind::Txt, &mut pending, DEFAULT_MAX_NAME_LENGTH),
            AnswerData::Strings(vec![Vec::new()])
        );
        assert_eq!(
            next_chunk(AnswerKind::Null, &mut pending, DEFAULT_MAX_NAME_LENGTH),
            AnswerData::Blob(Vec::new())
        );
        assert_eq!(
            next_chunk(AnswerKind::Cname, &mut pending, DEFAULT_MAX_NAME_LENGTH),
            AnswerData::Labels(Vec::new())
        );
    }

    #[test]
    fn test_drain_reproduces_stream() {
        for kind in [AnswerKind::Txt, AnswerKind::Null, AnswerKind::Cname] {
            let (mut pending, data) = pending_with(1000);
            let mut received = Vec::new();
            while !pending.is_empty() {
                let chunk = next_chunk(kind, &mut pending, DEFAULT_MAX_NAME_LENGTH);
                match &chunk {
                    AnswerData::Strings(_) => received.extend(decode_strings(&chunk).concat()),
                    AnswerData::Blob(blob) => received.extend(STANDARD.decode(blob).unwrap()),
                    AnswerData::Labels(_) => received.extend(decode_labels(&chunk)),
                }
            }
            assert_eq!(received, data, "{kind} drain");
        }
    }
}
