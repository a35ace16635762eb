//! Response envelopes built from the request they answer.

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::Record;

use super::answer::AnswerData;

/// Answers are never worth caching.
const ANSWER_TTL: u32 = 0;

/// Encodes a response to `request` carrying one answer record with `data`.
///
/// The answer is owned by the request's question name.
pub fn build_answer(request: &Message, data: AnswerData) -> std::io::Result<Vec<u8>> {
    let query = request.queries().first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "request has no question")
    })?;

    let mut response = response_to(request);
    let record = Record::from_rdata(query.name().clone(), ANSWER_TTL, data.into_rdata()?);
    response.add_answer(record);

    encode(&response)
}

/// Encodes an answerless response to `request` with the given error code.
pub fn build_rejection(request: &Message, code: ResponseCode) -> std::io::Result<Vec<u8>> {
    let mut response = response_to(request);
    response.set_response_code(code);
    encode(&response)
}

/// Copies the request's identity and question, marked as a recursive reply.
fn response_to(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_op_code(request.op_code())
        .set_message_type(MessageType::Response)
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .add_queries(request.queries().to_vec());
    response
}

fn encode(response: &Message) -> std::io::Result<Vec<u8>> {
    response.to_vec().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("failed to encode response: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{OpCode, Query};
    use hickory_proto::rr::{Name, RData, RecordType};

    fn request(record_type: RecordType) -> Message {
        let mut request = Message::new();
        request
            .set_id(0x1234)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(
                Name::from_ascii("abc.t.example.com.").unwrap(),
                record_type,
            ));
        request
    }

    #[test]
    fn test_answer_echoes_request() {
        let request = request(RecordType::TXT);
        let bytes =
            build_answer(&request, AnswerData::Strings(vec![vec![0, 0, 0, 42]])).unwrap();
        let response = Message::from_vec(&bytes).unwrap();

        assert_eq!(response.id(), 0x1234);
        assert_eq!(response.message_type(), MessageType::Response);
        assert!(response.recursion_desired());
        assert!(response.recursion_available());
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.queries(), request.queries());
        assert_eq!(response.answers().len(), 1);

        let answer = &response.answers()[0];
        assert_eq!(answer.name(), request.queries()[0].name());
        assert_eq!(answer.record_type(), RecordType::TXT);
        assert_eq!(answer.ttl(), 0);
        let RData::TXT(txt) = answer.data() else {
            panic!("expected TXT answer");
        };
        assert_eq!(&txt.txt_data()[0][..], &[0, 0, 0, 42]);
    }

    #[test]
    fn test_null_answer() {
        let request = request(RecordType::NULL);
        let bytes = build_answer(&request, AnswerData::Blob(b"QUJD".to_vec())).unwrap();
        let response = Message::from_vec(&bytes).unwrap();
        let RData::NULL(null) = response.answers()[0].data() else {
            panic!("expected NULL answer");
        };
        assert_eq!(null.anything(), b"QUJD");
    }

    #[test]
    fn test_cname_answer() {
        let request = request(RecordType::CNAME);
        let labels = vec![b"MFRGG".to_vec(), b"MRSWM".to_vec()];
        let bytes = build_answer(&request, AnswerData::Labels(labels)).unwrap();
        let response = Message::from_vec(&bytes).unwrap();
        let RData::CNAME(cname) = response.answers()[0].data() else {
            panic!("expected CNAME answer");
        };
        assert_eq!(cname.0.to_ascii(), "MFRGG.MRSWM.");
    }

    #[test]
    fn test_rejection_has_no_answer() {
        let request = request(RecordType::TXT);
        let bytes = build_rejection(&request, ResponseCode::FormErr).unwrap();
        let response = Message::from_vec(&bytes).unwrap();
        assert_eq!(response.id(), 0x1234);
        assert_eq!(response.response_code(), ResponseCode::FormErr);
        assert!(response.answers().is_empty());
        assert!(response.recursion_available());
    }

    #[test]
    fn test_answer_requires_question() {
        let request = Message::new();
        assert!(build_answer(&request, AnswerData::Blob(vec![1])).is_err());
    }
}
