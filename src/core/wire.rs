//! Length-prefixed UTF-8 string framing.
//!
//! Every string on the wire is a 4-byte big-endian *byte* count (not a
//! character count) followed by the raw UTF-8 bytes. A short read while the
//! declared count is outstanding is a hard failure, never a shorter string.

use crate::error::{LinkError, Result};
use bytes::BufMut;
use std::io::{self, Read};
use tracing::warn;

/// Longest string byte length older bridge revisions tolerate.
///
/// Writing past this is not an error on our side, but the peer may drop the
/// connection, so it is flagged loudly.
pub const MAX_STR_LEN: usize = i16::MAX as usize;

/// Encode `s` as a length-prefixed UTF-8 string frame.
///
/// The full frame is always written, even when the byte length exceeds
/// [`MAX_STR_LEN`]; the oversize case only logs a compatibility warning.
pub fn write_str(buf: &mut impl BufMut, s: &str) {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_STR_LEN {
        warn!(
            len = bytes.len(),
            max = MAX_STR_LEN,
            "writing string frame over MAX_STR_LEN, older bridge revisions may drop the connection"
        );
    }
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Decode one length-prefixed UTF-8 string frame from `r`.
///
/// # Errors
/// - [`LinkError::TruncatedFrame`] when the stream ends before the declared
///   byte count has been read
/// - [`LinkError::DecodeError`] when the payload is not valid UTF-8
/// - [`LinkError::Io`] for any other read failure
pub fn read_str<R: Read + ?Sized>(r: &mut R) -> Result<String> {
    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)
        .map_err(|e| truncation(len_bytes.len(), e))?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).map_err(|e| truncation(len, e))?;

    String::from_utf8(payload)
        .map_err(|e| LinkError::DecodeError(format!("invalid UTF-8 in string frame: {e}")))
}

fn truncation(expected: usize, err: io::Error) -> LinkError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        LinkError::TruncatedFrame { expected }
    } else {
        LinkError::Io(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::io::Cursor;

    fn round_trip(s: &str) -> String {
        let mut buf = BytesMut::new();
        write_str(&mut buf, s);
        read_str(&mut Cursor::new(buf.as_ref())).unwrap()
    }

    #[test]
    fn round_trips_plain_ascii() {
        assert_eq!(round_trip("bridge v1.0"), "bridge v1.0");
    }

    #[test]
    fn round_trips_empty_string() {
        assert_eq!(round_trip(""), "");
    }

    #[test]
    fn round_trips_multibyte_utf8() {
        let s = "mōśt chäotic ✶ bytes — 桥";
        assert_eq!(round_trip(s), s);
    }

    #[test]
    fn length_prefix_counts_bytes_not_chars() {
        let mut buf = BytesMut::new();
        write_str(&mut buf, "桥"); // 3 bytes, 1 char
        assert_eq!(&buf[..4], &3u32.to_be_bytes());
        assert_eq!(buf.len(), 4 + 3);
    }

    #[test]
    fn oversized_string_still_round_trips() {
        let s = "x".repeat(MAX_STR_LEN + 1);
        assert_eq!(round_trip(&s), s);
    }

    #[test]
    fn truncated_payload_fails_not_shortens() {
        let mut buf = BytesMut::new();
        buf.put_u32(100);
        buf.put_slice(&[0x61; 10]);
        let err = read_str(&mut Cursor::new(buf.as_ref())).unwrap_err();
        assert!(matches!(err, LinkError::TruncatedFrame { expected: 100 }));
    }

    #[test]
    fn truncated_length_prefix_fails() {
        let err = read_str(&mut Cursor::new(&[0u8, 0][..])).unwrap_err();
        assert!(matches!(err, LinkError::TruncatedFrame { .. }));
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_slice(&[0xC3, 0x28]);
        let err = read_str(&mut Cursor::new(buf.as_ref())).unwrap_err();
        assert!(matches!(err, LinkError::DecodeError(_)));
    }
}
