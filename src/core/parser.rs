//! Status frame parser
//!
//! Inbound frames are UTF-8 JSON objects. Anything else is a decode error
//! for that frame only.

use super::{Result, StatusMessage};
use tracing::{trace, warn};

/// Outbound keepalive poll frame
pub const POLL_FRAME: &str = "!";

/// Decode one inbound text frame into a status record.
pub fn parse_status(msg: &str) -> Result<StatusMessage> {
    trace!(len = msg.len(), "Parsing message");

    let status: StatusMessage = serde_json::from_str(msg).map_err(|e| {
        warn!(error = %e, "Failed to parse status JSON");
        e
    })?;

    if status.is_empty() {
        trace!("Status frame carried no known fields");
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;

    #[test]
    fn parses_minimal_record() {
        let msg = r#"{"hostname":"h","username":"u","pid":42,"clients":3}"#;

        let status = parse_status(msg).unwrap();
        assert_eq!(status.hostname.as_deref(), Some("h"));
        assert_eq!(status.username.as_deref(), Some("u"));
        assert_eq!(status.pid, Some(42));
        assert_eq!(status.clients, Some(3));
        assert_eq!(status.msgs, None);
    }

    #[test]
    fn parses_counter_and_ignores_unknown_fields() {
        let msg = r#"{
            "hostname": "kigoron01",
            "username": "svc",
            "pid": 4321,
            "clients": 2,
            "msgs": 918273,
            "uptime": "3d"
        }"#;

        let status = parse_status(msg).unwrap();
        assert_eq!(status.msgs, Some(918273));
        assert_eq!(status.hostname.as_deref(), Some("kigoron01"));
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(parse_status("{not json"), Err(Error::Decode(_))));
        assert!(matches!(parse_status("12"), Err(Error::Decode(_))));
        assert!(matches!(
            parse_status(r#"{"pid":"abc"}"#),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn empty_object_is_valid() {
        let status = parse_status("{}").unwrap();
        assert!(status.is_empty());
    }
}
