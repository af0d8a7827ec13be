//! Request and response records shared by the server and the client.
//!
//! Records travel as fixed-size binary blobs in host byte order with no
//! framing: a request is 40 bytes (id, submission timestamp, service length),
//! a response is 9 bytes (id echo plus a one-byte status).

use crate::timing::Timestamp;
use std::time::Duration;

/// Size of an encoded [`Request`] on the wire.
pub const REQUEST_SIZE: usize = 40;
/// Size of an encoded [`Response`] on the wire.
pub const RESPONSE_SIZE: usize = 9;

/// A client request: an opaque correlation id, the client-stamped submission
/// time, and the amount of simulated work being asked for.
///
/// Immutable once received; the id is never validated or required to be
/// monotonic, it only correlates responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub id: u64,
    pub timestamp: Timestamp,
    pub length: Duration,
}

impl Request {
    pub fn encode(&self) -> [u8; REQUEST_SIZE] {
        let mut buf = [0u8; REQUEST_SIZE];
        let length = Timestamp::from_duration(self.length);
        buf[0..8].copy_from_slice(&self.id.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.timestamp.secs.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.timestamp.nanos.to_ne_bytes());
        buf[24..32].copy_from_slice(&length.secs.to_ne_bytes());
        buf[32..40].copy_from_slice(&length.nanos.to_ne_bytes());
        buf
    }

    pub fn decode(buf: &[u8; REQUEST_SIZE]) -> Request {
        let read_i64 = |range: std::ops::Range<usize>| {
            i64::from_ne_bytes(buf[range].try_into().expect("fixed-size slice"))
        };
        let length = Timestamp {
            secs: read_i64(24..32),
            nanos: read_i64(32..40),
        };
        Request {
            id: u64::from_ne_bytes(buf[0..8].try_into().expect("fixed-size slice")),
            timestamp: Timestamp {
                secs: read_i64(8..16),
                nanos: read_i64(16..24),
            },
            length: length.to_duration(),
        }
    }
}

/// Outcome reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Accepted,
    Rejected,
}

impl Status {
    pub fn as_byte(self) -> u8 {
        match self {
            Status::Accepted => 0,
            Status::Rejected => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Status {
        if byte == 0 {
            Status::Accepted
        } else {
            Status::Rejected
        }
    }
}

/// Per-request acknowledgment echoing the request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub req_id: u64,
    pub status: Status,
}

impl Response {
    pub fn encode(&self) -> [u8; RESPONSE_SIZE] {
        let mut buf = [0u8; RESPONSE_SIZE];
        buf[0..8].copy_from_slice(&self.req_id.to_ne_bytes());
        buf[8] = self.status.as_byte();
        buf
    }

    pub fn decode(buf: &[u8; RESPONSE_SIZE]) -> Response {
        Response {
            req_id: u64::from_ne_bytes(buf[0..8].try_into().expect("fixed-size slice")),
            status: Status::from_byte(buf[8]),
        }
    }
}

/// Server-side envelope around a [`Request`].
///
/// `receipt` is stamped by the connection handler when the record is read off
/// the socket; `start` and `completion` are stamped by the worker that
/// dequeues it and remain [`Timestamp::ZERO`] until then.
#[derive(Debug, Clone, Copy)]
pub struct QueuedRequest {
    pub request: Request,
    pub receipt: Timestamp,
    pub start: Timestamp,
    pub completion: Timestamp,
}

impl QueuedRequest {
    pub fn new(request: Request, receipt: Timestamp) -> QueuedRequest {
        QueuedRequest {
            request,
            receipt,
            start: Timestamp::ZERO,
            completion: Timestamp::ZERO,
        }
    }
}
