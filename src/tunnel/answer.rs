//! Answer record types the tunnel speaks, and their data.

use std::fmt;

use hickory_proto::rr::rdata::{CNAME, NULL, TXT};
use hickory_proto::rr::{Name, RData, RecordType};

/// Record types a client may poll or send uplink data with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerKind {
    Txt,
    Null,
    Cname,
}

impl AnswerKind {
    pub fn from_record_type(record_type: RecordType) -> Option<Self> {
        match record_type {
            RecordType::TXT => Some(AnswerKind::Txt),
            RecordType::NULL => Some(AnswerKind::Null),
            RecordType::CNAME => Some(AnswerKind::Cname),
            _ => None,
        }
    }

    pub fn record_type(self) -> RecordType {
        match self {
            AnswerKind::Txt => RecordType::TXT,
            AnswerKind::Null => RecordType::NULL,
            AnswerKind::Cname => RecordType::CNAME,
        }
    }
}

impl fmt::Display for AnswerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record_type())
    }
}

/// Data of the single answer record in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerData {
    /// TXT character-strings, one per segment.
    Strings(Vec<Vec<u8>>),
    /// NULL record contents.
    Blob(Vec<u8>),
    /// CNAME target labels. No labels means the root name.
    Labels(Vec<Vec<u8>>),
}

impl AnswerData {
    pub fn into_rdata(self) -> std::io::Result<RData> {
        let rdata = match self {
            AnswerData::Strings(strings) => {
                let strings: Vec<&[u8]> = strings.iter().map(Vec::as_slice).collect();
                RData::TXT(TXT::from_bytes(strings))
            }
            AnswerData::Blob(blob) => {
                if blob.is_empty() {
                    RData::NULL(NULL::new())
                } else {
                    RData::NULL(NULL::with(blob))
                }
            }
            AnswerData::Labels(labels) => {
                let name = if labels.is_empty() {
                    Name::root()
                } else {
                    Name::from_labels(labels.iter().map(Vec::as_slice)).map_err(|e| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("invalid CNAME answer: {e}"),
                        )
                    })?
                };
                RData::CNAME(CNAME(name))
            }
        };
        Ok(rdata)
    }
}
