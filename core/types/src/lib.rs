//! Shared value types used across the ting workspace.
//!
//! These are plain data types with no I/O of their own: a relay
//! fingerprint, a network endpoint, the three measurement legs, a
//! relay pair, and a single timing sample.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 40-hex-character string identifying a Tor relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

/// Error returned when a string is not a valid 40-hex-character fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid relay fingerprint: {0:?}")]
pub struct InvalidFingerprint(String);

impl Fingerprint {
    /// Build a `Fingerprint`, validating that `s` is exactly 40 hex characters.
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidFingerprint> {
        let s = s.into();
        let valid = s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit());
        if valid {
            Ok(Self(s.to_uppercase()))
        } else {
            Err(InvalidFingerprint(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::new(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A TCP endpoint: a host (IP or hostname) and a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One of the three circuits measured per pair of relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TingLeg {
    X,
    Y,
    Xy,
}

impl TingLeg {
    /// The number of hops a circuit for this leg must have.
    pub fn hop_count(self) -> usize {
        match self {
            TingLeg::X | TingLeg::Y => 3,
            TingLeg::Xy => 4,
        }
    }
}

impl fmt::Display for TingLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TingLeg::X => "x",
            TingLeg::Y => "y",
            TingLeg::Xy => "xy",
        };
        f.write_str(s)
    }
}

/// A pair of relays to be measured: (R1, R2).
pub type RelayPair = (Fingerprint, Fingerprint);

/// One (outbound, inbound) timing datum from a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds from the client sending the request to the responder's timestamp.
    pub outbound_s: f64,
    /// Seconds from the responder's timestamp to the client receiving the reply.
    pub inbound_s: f64,
}

impl Sample {
    pub fn new(outbound_s: f64, inbound_s: f64) -> Self {
        Self {
            outbound_s,
            inbound_s,
        }
    }

    /// Full round-trip time represented by this sample.
    pub fn total_s(&self) -> f64 {
        self.outbound_s + self.inbound_s
    }
}

/// An identifier Tor assigns to a built circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitId(pub u64);

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An identifier Tor assigns to an application stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
