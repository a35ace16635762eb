//! DNS tunnel: query routing, per-connection sessions and response encoding.
//!
//! - [`request`]: parses a query into a session key and an uplink payload
//! - [`dispatcher`]: routes queries to sessions, creating them on first use
//! - [`session`]: the per-connection actor owning the backend stream
//! - [`uplink`] / [`downlink`]: payload decoding, acks and answer chunking
//! - [`response`]: builds the response envelope for a query

mod answer;
mod dispatcher;
mod downlink;
mod pending;
mod request;
mod response;
mod session;
mod sink;
mod uplink;

pub use answer::{AnswerData, AnswerKind};
pub use dispatcher::Dispatcher;
pub use downlink::{CNAME_MAX_BYTES, NULL_MAX_BYTES, SEGMENT_SIZE, TXT_MAX_BYTES, next_chunk};
pub use pending::PendingDownlink;
pub use request::{RoutedRequest, TunnelRequest, parse_request};
pub use response::{build_answer, build_rejection};
pub use session::{
    BackendStream, SessionEndReason, SessionExit, SessionHandle, create_session, spawn_session,
};
pub use sink::ResponseSink;
pub use uplink::{ack, decode_payload};
