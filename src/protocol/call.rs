//! Remote-call envelopes
//!
//! Both shapes ride inside a durable [`Envelope`](super::Envelope) on
//! [`CALL_TAG`](super::CALL_TAG). A leading discriminator octet tells
//! the completion thread whether it is looking at a request for a local
//! handler or a response for a pending call.
//!
//! ```text
//! request:  [0] = 1, [1] function_tag, [2] call_id, [3..7] param_len u32, params
//! response: [0] = 2, [1] call_id,      [2..6] result_len u32,             result
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::protocol::Tag;

const DISCRIMINATOR_REQUEST: u8 = 1;
const DISCRIMINATOR_RESPONSE: u8 = 2;

const REQUEST_HEADER_LEN: usize = 7;
const RESPONSE_HEADER_LEN: usize = 6;

/// A remote-call request: run `function_tag` with `params` and answer
/// under `call_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub function_tag: Tag,
    pub call_id: u8,
    pub params: Vec<u8>,
}

/// A remote-call response correlated by `call_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub call_id: u8,
    pub result: Vec<u8>,
}

/// Either shape, as decoded off the reserved tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFrame {
    Request(CallRequest),
    Response(CallResponse),
}

impl CallRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; REQUEST_HEADER_LEN + self.params.len()];
        buf[0] = DISCRIMINATOR_REQUEST;
        buf[1] = self.function_tag;
        buf[2] = self.call_id;
        BigEndian::write_u32(&mut buf[3..7], self.params.len() as u32);
        buf[REQUEST_HEADER_LEN..].copy_from_slice(&self.params);
        buf
    }
}

impl CallResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; RESPONSE_HEADER_LEN + self.result.len()];
        buf[0] = DISCRIMINATOR_RESPONSE;
        buf[1] = self.call_id;
        BigEndian::write_u32(&mut buf[2..6], self.result.len() as u32);
        buf[RESPONSE_HEADER_LEN..].copy_from_slice(&self.result);
        buf
    }
}

impl CallFrame {
    /// Structural validation before any field is trusted.
    pub fn validate(buf: &[u8]) -> Result<()> {
        let Some(&discriminator) = buf.first() else {
            return Err(Error::malformed("call", "empty buffer"));
        };
        let (header_len, length_offset) = match discriminator {
            DISCRIMINATOR_REQUEST => (REQUEST_HEADER_LEN, 3),
            DISCRIMINATOR_RESPONSE => (RESPONSE_HEADER_LEN, 2),
            other => {
                return Err(Error::malformed(
                    "call",
                    format!("unknown discriminator {}", other),
                ))
            }
        };
        if buf.len() < header_len {
            return Err(Error::malformed(
                "call",
                format!("{} bytes is shorter than the {} byte header", buf.len(), header_len),
            ));
        }
        let declared = BigEndian::read_u32(&buf[length_offset..length_offset + 4]) as usize;
        let present = buf.len() - header_len;
        if declared != present {
            return Err(Error::malformed(
                "call",
                format!("declared body of {} bytes but {} present", declared, present),
            ));
        }
        Ok(())
    }

    /// Decode either call shape from a validated or untrusted buffer.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::validate(buf)?;
        match buf[0] {
            DISCRIMINATOR_REQUEST => Ok(CallFrame::Request(CallRequest {
                function_tag: buf[1],
                call_id: buf[2],
                params: buf[REQUEST_HEADER_LEN..].to_vec(),
            })),
            _ => Ok(CallFrame::Response(CallResponse {
                call_id: buf[1],
                result: buf[RESPONSE_HEADER_LEN..].to_vec(),
            })),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = CallRequest {
            function_tag: 9,
            call_id: 255,
            params: vec![1, 2, 3],
        };
        match CallFrame::decode(&request.encode()).unwrap() {
            CallFrame::Request(decoded) => assert_eq!(decoded, request),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_response_roundtrip() {
        let response = CallResponse {
            call_id: 0,
            result: Vec::new(),
        };
        match CallFrame::decode(&response.encode()).unwrap() {
            CallFrame::Response(decoded) => assert_eq!(decoded, response),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_unknown_discriminator() {
        assert!(CallFrame::decode(&[7, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(CallFrame::decode(&[]).is_err());
    }

    #[test]
    fn test_reject_length_mismatch() {
        let mut buf = CallRequest {
            function_tag: 1,
            call_id: 2,
            params: vec![5, 5],
        }
        .encode();
        buf[6] = 9;
        assert!(CallFrame::validate(&buf).is_err());
    }

    #[test]
    fn test_request_is_not_a_valid_response() {
        // A request buffer must never decode as a response; the
        // discriminator keeps the two shapes apart on the shared tag.
        let buf = CallRequest {
            function_tag: 4,
            call_id: 8,
            params: vec![0; 16],
        }
        .encode();
        assert!(matches!(
            CallFrame::decode(&buf).unwrap(),
            CallFrame::Request(_)
        ));
    }
}
