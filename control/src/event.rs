//! Parsed Tor control-port asynchronous events.
//!
//! Only `STREAM` events are exposed outside this crate; `CIRC` events are
//! consumed internally by [`crate::real::TorController::new_circuit`] to
//! implement `await_build`.

use ting_types::{CircuitId, StreamId};

/// A parsed `650 STREAM ...` event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub stream_id: StreamId,
    pub status: StreamStatus,
    pub circ_id: Option<CircuitId>,
    pub target_port: Option<u16>,
    pub purpose: Option<String>,
}

/// `StreamStatus` values Tor can report for a stream. Unrecognized values
/// round-trip as `Other` rather than failing to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    New,
    NewResolve,
    SentConnect,
    SentResolve,
    Succeeded,
    Failed,
    Closed,
    Detached,
    Remap,
    Other(String),
}

impl StreamStatus {
    fn parse(s: &str) -> Self {
        match s {
            "NEW" => StreamStatus::New,
            "NEWRESOLVE" => StreamStatus::NewResolve,
            "SENTCONNECT" => StreamStatus::SentConnect,
            "SENTRESOLVE" => StreamStatus::SentResolve,
            "SUCCEEDED" => StreamStatus::Succeeded,
            "FAILED" => StreamStatus::Failed,
            "CLOSED" => StreamStatus::Closed,
            "DETACHED" => StreamStatus::Detached,
            "REMAP" => StreamStatus::Remap,
            other => StreamStatus::Other(other.to_string()),
        }
    }
}

/// A parsed `650 CIRC ...` event line, used only to implement `await_build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CircEvent {
    pub circ_id: CircuitId,
    pub status: CircStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CircStatus {
    Launched,
    Built,
    Extended,
    Failed,
    Closed,
    Other(String),
}

impl CircStatus {
    fn parse(s: &str) -> Self {
        match s {
            "LAUNCHED" => CircStatus::Launched,
            "BUILT" => CircStatus::Built,
            "EXTENDED" => CircStatus::Extended,
            "FAILED" => CircStatus::Failed,
            "CLOSED" => CircStatus::Closed,
            other => CircStatus::Other(other.to_string()),
        }
    }
}

/// Either kind of event the monitor task can hand upstream. Kept internal:
/// only `StreamEvent`s cross the crate boundary.
#[derive(Debug, Clone)]
pub(crate) enum RawEvent {
    Stream(StreamEvent),
    Circ(CircEvent),
}

impl RawEvent {
    /// Parse the body of a `650` line, e.g. `STREAM 15 NEW 0 example.com:80
    /// PURPOSE=USER` or `CIRC 9 BUILT $AAAA...,$BBBB... PURPOSE=general`.
    pub(crate) fn parse(body: &str) -> Option<RawEvent> {
        let mut tokens = body.split_whitespace();
        let kind = tokens.next()?;
        match kind {
            "STREAM" => {
                let stream_id: u64 = tokens.next()?.parse().ok()?;
                let status = StreamStatus::parse(tokens.next()?);
                let circ_raw: u64 = tokens.next()?.parse().ok()?;
                let target = tokens.next();
                let target_port = target
                    .and_then(|t| t.rsplit_once(':'))
                    .and_then(|(_, port)| port.parse().ok());
                let circ_id = if circ_raw == 0 {
                    None
                } else {
                    Some(CircuitId(circ_raw))
                };
                let purpose = tokens
                    .find_map(|tok| tok.strip_prefix("PURPOSE=").map(|p| p.to_string()));
                Some(RawEvent::Stream(StreamEvent {
                    stream_id: StreamId(stream_id),
                    status,
                    circ_id,
                    target_port,
                    purpose,
                }))
            }
            "CIRC" => {
                let circ_id: u64 = tokens.next()?.parse().ok()?;
                let status = CircStatus::parse(tokens.next()?);
                Some(RawEvent::Circ(CircEvent {
                    circ_id: CircuitId(circ_id),
                    status,
                }))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_new_event() {
        let event = RawEvent::parse("STREAM 15 NEW 0 example.com:80 PURPOSE=USER").unwrap();
        match event {
            RawEvent::Stream(e) => {
                assert_eq!(e.stream_id, StreamId(15));
                assert_eq!(e.status, StreamStatus::New);
                assert_eq!(e.circ_id, None);
                assert_eq!(e.target_port, Some(80));
                assert_eq!(e.purpose.as_deref(), Some("USER"));
            }
            _ => panic!("expected a stream event"),
        }
    }

    #[test]
    fn parses_circ_built_event() {
        let event = RawEvent::parse("CIRC 9 BUILT $AAAA,$BBBB PURPOSE=general").unwrap();
        match event {
            RawEvent::Circ(e) => {
                assert_eq!(e.circ_id, CircuitId(9));
                assert_eq!(e.status, CircStatus::Built);
            }
            _ => panic!("expected a circ event"),
        }
    }

    #[test]
    fn unrecognized_event_kind_is_ignored() {
        assert!(RawEvent::parse("ORCONN $AAAA CONNECTED").is_none());
    }

    #[test]
    fn unknown_status_round_trips_as_other() {
        let event = RawEvent::parse("STREAM 1 PURPOSE_CHANGED 2 example.com:80").unwrap();
        match event {
            RawEvent::Stream(e) => assert_eq!(e.status, StreamStatus::Other("PURPOSE_CHANGED".into())),
            _ => panic!("expected a stream event"),
        }
    }
}
