//! Client queries as seen by a session.
//!
//! Query names are laid out as `[<payload label>.]*<session key>.<domain>`:
//! the label left of the tunnel zone routes the query to a session, and any
//! labels before it carry base32 uplink data.

use std::net::SocketAddr;

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::Name;

use super::answer::AnswerKind;

/// One decoded client query.
#[derive(Debug, Clone)]
pub struct TunnelRequest {
    /// Where the response goes.
    pub client: SocketAddr,
    /// The parsed query, echoed back in the response.
    pub message: Message,
    pub kind: AnswerKind,
    /// Encoded uplink payload. `None` makes this a poll.
    pub uplink: Option<String>,
}

/// A request together with the session key it routes to.
#[derive(Debug, Clone)]
pub struct RoutedRequest {
    pub key: String,
    pub request: TunnelRequest,
}

fn invalid(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

/// Parses a raw query packet addressed to the tunnel zone `domain`.
///
/// `domain` must be lowercase; query names are compared case-insensitively.
pub fn parse_request(
    packet: &[u8],
    client: SocketAddr,
    domain: &Name,
) -> std::io::Result<RoutedRequest> {
    let message =
        Message::from_vec(packet).map_err(|e| invalid(format!("malformed query: {e}")))?;

    if message.message_type() != MessageType::Query {
        return Err(invalid("not a query".to_string()));
    }

    let (kind, qname) = {
        let query = message
            .queries()
            .first()
            .ok_or_else(|| invalid("query has no question".to_string()))?;
        let kind = AnswerKind::from_record_type(query.query_type()).ok_or_else(|| {
            invalid(format!("unsupported record type {}", query.query_type()))
        })?;
        (kind, query.name().to_lowercase())
    };

    if !domain.zone_of(&qname) {
        return Err(invalid(format!("{qname} is outside {domain}")));
    }

    let labels: Vec<&[u8]> = qname.iter().collect();
    let prefix_len = labels.len().saturating_sub(domain.num_labels() as usize);
    if prefix_len == 0 {
        return Err(invalid(format!("{qname} has no session key")));
    }

    let key = std::str::from_utf8(labels[prefix_len - 1])
        .map_err(|_| invalid(format!("{qname} has a non-text session key")))?
        .to_string();

    let payload = labels[..prefix_len - 1].concat();
    let uplink = if payload.is_empty() {
        None
    } else {
        Some(
            String::from_utf8(payload)
                .map_err(|_| invalid(format!("{qname} has a non-text payload")))?,
        )
    };

    Ok(RoutedRequest {
        key,
        request: TunnelRequest {
            client,
            message,
            kind,
            uplink,
        },
    })
}
