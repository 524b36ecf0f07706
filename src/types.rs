//! REVENANT - Core Type Definitions
//! Request/response DTOs and the command name constants shared by the
//! dispatch, transaction and AOF subsystems.

use serde::{Deserialize, Serialize};

/// A single command as received from a client (or decoded from the AOF).
///
/// `seq_id` is a caller-supplied correlation identifier echoed back in the
/// matching [`Response`], so asynchronous request/response pairing works
/// without relying on ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub seq_id: String,
    pub cmd: String,
    pub args: Vec<String>,
}

impl Request {
    /// Build a request from a command name and its arguments.
    pub fn new(seq_id: impl Into<String>, cmd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            seq_id: seq_id.into(),
            cmd: cmd.into(),
            args,
        }
    }
}

/// Status discriminant of a [`Response`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

/// The reply produced for every request: either a success payload (a list
/// of string results) or an error payload (human-readable reason).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub seq_id: String,
    pub status: Status,
    pub args: Vec<String>,
}

impl Response {
    /// Success response with an arbitrary payload.
    pub fn ok(seq_id: &str, args: Vec<String>) -> Self {
        Self {
            seq_id: seq_id.to_string(),
            status: Status::Ok,
            args,
        }
    }

    /// Success response carrying a single numeric result.
    pub fn num(seq_id: &str, n: i64) -> Self {
        Self::ok(seq_id, vec![n.to_string()])
    }

    /// Error response with a human-readable reason.
    pub fn error(seq_id: &str, reason: impl Into<String>) -> Self {
        Self {
            seq_id: seq_id.to_string(),
            status: Status::Error,
            args: vec![reason.into()],
        }
    }

    /// Returns true if this is a success response.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

// Command names. Handlers match on the uppercased command, so these are the
// canonical spellings used by the registry, the AOF and the tests.
pub const CMD_PING: &str = "PING";

pub const CMD_SELECT: &str = "SELECT";
pub const CMD_DBSIZE: &str = "DBSIZE";
pub const CMD_REWRITEAOF: &str = "REWRITEAOF";

pub const CMD_MULTI: &str = "MULTI";
pub const CMD_DISCARD: &str = "DISCARD";
pub const CMD_EXEC: &str = "EXEC";
pub const CMD_WATCH: &str = "WATCH";
pub const CMD_UNWATCH: &str = "UNWATCH";

pub const CMD_SET: &str = "SET";
pub const CMD_GET: &str = "GET";
pub const CMD_INCRBY: &str = "INCRBY";
pub const CMD_SETNX: &str = "SETNX";
pub const CMD_SETEX: &str = "SETEX";

pub const CMD_ZADD: &str = "ZADD";
pub const CMD_ZREM: &str = "ZREM";
pub const CMD_ZRANGE: &str = "ZRANGE";
pub const CMD_ZCARD: &str = "ZCARD";
pub const CMD_ZSCORE: &str = "ZSCORE";
pub const CMD_ZRANK: &str = "ZRANK";

pub const CMD_EXISTS: &str = "EXISTS";
pub const CMD_TYPE: &str = "TYPE";
pub const CMD_TTL: &str = "TTL";
pub const CMD_DEL: &str = "DEL";
pub const CMD_EXPIRE: &str = "EXPIRE";
pub const CMD_PERSIST: &str = "PERSIST";

/// Absolute-deadline expiry. Never issued by clients: emitted into the AOF
/// by the relative-to-absolute translation and consumed during replay.
pub const CMD_ABSEXPIRE: &str = "ABSEXPIRE";

/// Placeholder returned by GET for keys that do not exist.
pub const NIL: &str = "NIL";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_helpers() {
        let ok = Response::ok("7", vec!["a".into(), "b".into()]);
        assert!(ok.is_ok());
        assert_eq!(ok.seq_id, "7");
        assert_eq!(ok.args, vec!["a", "b"]);

        let num = Response::num("8", -1);
        assert_eq!(num.args, vec!["-1"]);

        let err = Response::error("9", "boom");
        assert!(!err.is_ok());
        assert_eq!(err.args, vec!["boom"]);
    }

    #[test]
    fn test_request_json_round_trip() {
        let req = Request::new("42", CMD_SET, vec!["k".into(), "v".into()]);
        let encoded = serde_json::to_string(&req).unwrap();
        let decoded: Request = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, req);
    }
}
