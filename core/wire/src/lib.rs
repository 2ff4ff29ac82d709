//! The length-delimited frame protocol exchanged between the ting client
//! and the echo responder.
//!
//! A frame carries an enumerated type tag and, for `Ting` frames, a
//! 64-bit wall-clock time in seconds. `Close` frames carry no payload.
//! The encoding is intentionally tiny (at most 10 bytes) and
//! self-describing: a decoder recovers `ptype` even when `time_sec` is
//! absent.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ting_error::TingError;

const TAG_TING: u8 = 0;
const TAG_CLOSE: u8 = 1;
const HAS_TIME: u8 = 1;
const NO_TIME: u8 = 0;

/// The frame's message kind. Modeled as a sum type rather than a string or
/// raw integer so an unrecognized tag is a decode error, not a silent typo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Ting,
    Close,
}

/// A single wire message: a type tag plus an optional wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub ptype: PacketType,
    pub time_sec: Option<f64>,
}

impl Frame {
    /// Build a `Ting` frame carrying `time_sec`.
    pub fn ting(time_sec: f64) -> Self {
        Self {
            ptype: PacketType::Ting,
            time_sec: Some(time_sec),
        }
    }

    /// Build a `Close` frame. Carries no time.
    pub fn close() -> Self {
        Self {
            ptype: PacketType::Close,
            time_sec: None,
        }
    }

    /// Encode this frame. The result is always at most 10 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let tag = match self.ptype {
            PacketType::Ting => TAG_TING,
            PacketType::Close => TAG_CLOSE,
        };
        match self.time_sec {
            Some(t) => {
                let mut buf = Vec::with_capacity(10);
                buf.push(tag);
                buf.push(HAS_TIME);
                buf.extend_from_slice(&t.to_le_bytes());
                buf
            }
            None => vec![tag, NO_TIME],
        }
    }

    /// Decode a frame from `bytes`. Fails with [`TingError::Decode`] if the
    /// bytes are too short or the tag is unrecognized.
    pub fn decode(bytes: &[u8]) -> Result<Self, TingError> {
        if bytes.len() < 2 {
            return Err(TingError::Decode(format!(
                "frame too short: {} byte(s)",
                bytes.len()
            )));
        }
        let ptype = match bytes[0] {
            TAG_TING => PacketType::Ting,
            TAG_CLOSE => PacketType::Close,
            other => return Err(TingError::Decode(format!("unknown packet tag {other}"))),
        };
        let time_sec = match bytes[1] {
            NO_TIME => None,
            HAS_TIME => {
                let rest = &bytes[2..];
                if rest.len() < 8 {
                    return Err(TingError::Decode(format!(
                        "frame declares a time field but only has {} trailing byte(s)",
                        rest.len()
                    )));
                }
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&rest[..8]);
                Some(f64::from_le_bytes(arr))
            }
            other => {
                return Err(TingError::Decode(format!(
                    "unknown has-time marker {other}"
                )))
            }
        };
        Ok(Self { ptype, time_sec })
    }
}

/// Write one length-delimited frame to `writer`: a one-byte payload length
/// followed by [`Frame::encode`]'s output.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), TingError> {
    let payload = frame.encode();
    let len = u8::try_from(payload.len()).expect("frame payload always fits in a u8");
    writer.write_all(&[len]).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-delimited frame from `reader`. Returns `Ok(None)` on a
/// clean EOF before any bytes were read (the "zero bytes" case in the
/// responder's accept loop), and an error on a truncated message.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>, TingError> {
    let mut len_buf = [0u8; 1];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut payload = vec![0u8; len_buf[0] as usize];
    reader.read_exact(&mut payload).await?;
    Frame::decode(&payload).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ting_frame() {
        let f = Frame::ting(1.5);
        let bytes = f.encode();
        assert!(bytes.len() <= 64);
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, f);
        assert_eq!(decoded.ptype, PacketType::Ting);
        assert_eq!(decoded.time_sec, Some(1.5));
    }

    #[test]
    fn round_trips_close_frame() {
        let f = Frame::close();
        let bytes = f.encode();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, f);
        assert_eq!(decoded.ptype, PacketType::Close);
        assert_eq!(decoded.time_sec, None);
    }

    #[test]
    fn decode_recovers_ptype_without_time() {
        let bytes = Frame::close().encode();
        let (ptype, time) = {
            let f = Frame::decode(&bytes).unwrap();
            (f.ptype, f.time_sec)
        };
        assert_eq!(ptype, PacketType::Close);
        assert_eq!(time, None);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(Frame::decode(&[]).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(Frame::decode(&[0xFF, 0]).is_err());
    }

    #[test]
    fn rejects_truncated_time_field() {
        assert!(Frame::decode(&[TAG_TING, HAS_TIME, 1, 2, 3]).is_err());
    }

    #[tokio::test]
    async fn write_then_read_frame_round_trips() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, &Frame::ting(42.0)).await.unwrap();
        let got = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(got, Frame::ting(42.0));
    }

    #[tokio::test]
    async fn read_frame_reports_clean_eof_as_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let got = read_frame(&mut server).await.unwrap();
        assert_eq!(got, None);
    }
}
