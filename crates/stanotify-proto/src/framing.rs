//! Message framing for the control and ingest sockets.
//!
//! Each message is a 4-byte big-endian length prefix followed by a JSON
//! payload.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Error;

/// Maximum message size (4 MB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a payload with a length prefix.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "payload size {} exceeds maximum {}",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Extract the payload from a complete frame.
pub fn extract_payload(frame: &[u8]) -> Result<&[u8], Error> {
    if frame.len() < LENGTH_PREFIX_SIZE {
        return Err(Error::InvalidMessage("frame too short".to_string()));
    }

    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    header.copy_from_slice(&frame[..LENGTH_PREFIX_SIZE]);
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "frame length {} exceeds maximum {}",
            len, MAX_MESSAGE_SIZE
        )));
    }

    if frame.len() < LENGTH_PREFIX_SIZE + len {
        return Err(Error::InvalidMessage(format!(
            "frame incomplete: have {}, need {}",
            frame.len(),
            LENGTH_PREFIX_SIZE + len
        )));
    }

    Ok(&frame[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + len])
}

/// Serialize `value` as JSON and frame it.
pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let payload = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
    encode_frame(&payload)
}

/// Unframe and deserialize a JSON message.
pub fn decode_json<T: DeserializeOwned>(frame: &[u8]) -> Result<T, Error> {
    let payload = extract_payload(frame)?;
    serde_json::from_slice(payload).map_err(|e| Error::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ControlRequest, ControlResponse};

    #[test]
    fn test_encode_frame_small() {
        let payload = b"hello";
        let frame = encode_frame(payload).unwrap();

        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + payload.len());
        assert_eq!(&frame[..4], &[0, 0, 0, 5]);
        assert_eq!(&frame[4..], payload);
    }

    #[test]
    fn test_encode_frame_too_large() {
        let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(encode_frame(&payload).is_err());
    }

    #[test]
    fn test_extract_payload() {
        let frame = [0, 0, 0, 2, 1, 2, 3, 4, 5];
        assert_eq!(extract_payload(&frame).unwrap(), &[1, 2]);

        assert!(extract_payload(&[0, 0, 0]).is_err());
        assert!(extract_payload(&[0, 0, 0, 5, 1]).is_err());
    }

    #[test]
    fn test_json_messages() {
        let frame = encode_json(&ControlRequest::Ping).unwrap();
        let decoded: ControlRequest = decode_json(&frame).unwrap();
        assert_eq!(decoded, ControlRequest::Ping);

        let garbage = encode_frame(b"{not json").unwrap();
        assert!(matches!(
            decode_json::<ControlResponse>(&garbage),
            Err(Error::Deserialization(_))
        ));
    }
}
