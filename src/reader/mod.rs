//! Streaming frame extraction from a P1 byte stream.
//!
//! A meter transmits one telegram every few seconds: the bytes from the
//! leading '/' up to and including the '!' terminator, followed by a
//! trailer line carrying the CRC-16 of the frame as four uppercase hex
//! digits. [`P1Reader`] scans an unbounded byte stream for those frames,
//! verifies each one and yields only the telegrams that pass both the CRC
//! and the structural checks. Frames that fail are logged and dropped;
//! scanning always re-anchors on the next '/'.

use crate::crc::{Table, DSMR_POLY};
use crate::telegram::{parse_telegram, Telegram};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;
use tokio::sync::mpsc::Receiver;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("stream ended before telegram terminator")]
    StreamTerminatorMissing,
    #[error("unexpected number of CRC bytes")]
    TrailerLengthMismatch,
    #[error("CRC values do not match: {received} vs {computed}")]
    ChecksumMismatch { received: String, computed: String },
    #[error("telegram exceeds the maximum allowed size")]
    FrameTooLarge,
    #[error("error reading from the P1 stream")]
    Io(#[from] std::io::Error),
}

fn max_telegram_size_default() -> usize { return 16384 }
fn channel_capacity_default() -> usize { return 10 }

/// Tuning knobs for the frame extractor. The defaults fit real meters,
/// whose telegrams stay around one kilobyte.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ReaderConfig {
    /// Upper bound on the byte size of a single frame. The protocol itself
    /// does not cap telegram length, so a stream that never yields a '!'
    /// would otherwise buffer without limit.
    #[serde(default = "max_telegram_size_default")]
    pub max_telegram_size: usize,
    /// Capacity of the hand-off channel returned by [`poll`].
    #[serde(default = "channel_capacity_default")]
    pub channel_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        return ReaderConfig {
            max_telegram_size: max_telegram_size_default(),
            channel_capacity: channel_capacity_default(),
        };
    }
}

/// Scans a byte stream for verified telegrams.
///
/// The reader is the only writer to its internal buffer and owns its CRC
/// table; there is no shared state between readers. Iterating blocks on
/// the underlying stream until a complete frame is available and ends when
/// the stream is exhausted.
pub struct P1Reader<R: Read> {
    input: BufReader<R>,
    table: Table,
    config: ReaderConfig,
}

impl<R: Read> P1Reader<R> {
    pub fn new(input: R) -> Self {
        return P1Reader::with_config(input, ReaderConfig::default());
    }

    pub fn with_config(input: R, config: ReaderConfig) -> Self {
        return P1Reader {
            input: BufReader::new(input),
            table: Table::new(DSMR_POLY),
            config,
        };
    }

    /// Scan for the next CRC-verified frame. `Ok(None)` means the stream
    /// is exhausted; any error refers to the current frame only and the
    /// next call re-anchors on the next '/'.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        // Seek-start: discard noise until the start marker.
        let mut skipped = Vec::new();
        self.input.read_until(b'/', &mut skipped)?;
        if !skipped.ends_with(b"/") {
            // End of stream with no further marker: clean termination.
            return Ok(None);
        }

        // The '/' is part of the CRC computation, so it stays in the frame.
        let mut frame = vec![b'/'];

        // Seek-end: accumulate up to and including the '!' terminator.
        let limit = self.config.max_telegram_size.saturating_sub(1) as u64;
        let read = self
            .input
            .by_ref()
            .take(limit)
            .read_until(b'!', &mut frame)?;
        if !frame.ends_with(b"!") {
            if read as u64 == limit {
                return Err(FramingError::FrameTooLarge);
            }
            return Err(FramingError::StreamTerminatorMissing);
        }

        // The trailer line must be exactly 4 hex digits plus CR LF.
        let mut trailer = Vec::new();
        self.input
            .by_ref()
            .take(limit)
            .read_until(b'\n', &mut trailer)?;
        if trailer.len() != 6 || trailer.last() != Some(&b'\n') {
            return Err(FramingError::TrailerLengthMismatch);
        }

        let received = String::from_utf8_lossy(&trailer[..4]).into_owned();
        let computed = format!("{:04X}", self.table.checksum(&frame));
        if received != computed {
            return Err(FramingError::ChecksumMismatch { received, computed });
        }

        return Ok(Some(frame));
    }
}

impl<R: Read> Iterator for P1Reader<R> {
    type Item = Telegram;

    fn next(&mut self) -> Option<Telegram> {
        loop {
            match self.next_frame() {
                Ok(Some(frame)) => match parse_telegram(&frame) {
                    Ok(telegram) => return Some(telegram),
                    Err(e) => {
                        warn!("telegram parsing error: {}", e);
                        continue;
                    }
                },
                Ok(None) => return None,
                Err(FramingError::Io(e)) => {
                    error!("error reading from the P1 stream: {}", e);
                    return None;
                }
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            }
        }
    }
}

/// Start polling the P1 port represented by `input`. The scan loop runs on
/// the blocking thread pool and verified telegrams are handed to the
/// returned channel; consumers slower than the meter back-pressure the
/// scanner once the channel is full. The channel closes exactly once, when
/// the input is exhausted.
pub fn poll<R: Read + Send + 'static>(input: R, config: ReaderConfig) -> Receiver<Telegram> {
    let capacity = config.channel_capacity.max(1);
    let (sender, receiver) = tokio::sync::mpsc::channel(capacity);

    tokio::task::spawn_blocking(move || {
        let reader = P1Reader::with_config(input, config);
        for telegram in reader {
            if sender.blocking_send(telegram).is_err() {
                // Receiver is gone, no point scanning further.
                break;
            }
        }
    });

    return receiver;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::structs::Value;
    use std::io::Cursor;

    const MINIMAL_PAYLOAD: &str = "/ISk5MT382\r\n\r\n!";
    const ENERGY_PAYLOAD: &str = "/ISk5MT382\r\n\r\n1-0:1.8.1(001234.567*kWh)\r\n!";

    /// Append the correct CRC trailer to a payload.
    fn frame(payload: &str) -> Vec<u8> {
        let table = Table::new(DSMR_POLY);
        let crc = table.checksum(payload.as_bytes());
        let mut out = payload.as_bytes().to_vec();
        out.extend_from_slice(format!("{:04X}\r\n", crc).as_bytes());
        return out;
    }

    fn collect(stream: Vec<u8>) -> Vec<Telegram> {
        return P1Reader::new(Cursor::new(stream)).collect();
    }

    #[test]
    fn test_stream_without_frames_is_empty() {
        assert!(collect(b"".to_vec()).is_empty());
        assert!(collect(b"there is no telegram in here".to_vec()).is_empty());
        // A marker without terminator runs into end-of-stream.
        assert!(collect(b"/ISk5MT382\r\n\r\n".to_vec()).is_empty());
    }

    #[test]
    fn test_single_valid_frame() {
        let telegrams = collect(frame(ENERGY_PAYLOAD));
        assert_eq!(telegrams.len(), 1);
        assert_eq!(
            telegrams[0].electricity_delivered_1,
            Some(Value {
                value: 1234567.0,
                unit: "Wh".to_string()
            })
        );
    }

    #[test]
    fn test_noise_before_marker_is_discarded() {
        let mut stream = b"@@@ line noise @@@".to_vec();
        stream.extend(frame(ENERGY_PAYLOAD));
        assert_eq!(collect(stream).len(), 1);
    }

    #[test]
    fn test_corrupted_frame_is_dropped() {
        let mut corrupted = frame(ENERGY_PAYLOAD);
        // Flip a digit inside the frame while keeping the trailer.
        let pos = ENERGY_PAYLOAD.find("1234").unwrap();
        corrupted[pos] = b'9';
        assert!(collect(corrupted).is_empty());
    }

    #[test]
    fn test_corrupted_frame_does_not_block_later_frames() {
        let mut stream = frame(ENERGY_PAYLOAD);
        let pos = ENERGY_PAYLOAD.find("1234").unwrap();
        stream[pos] = b'9';
        stream.extend(frame(MINIMAL_PAYLOAD));

        let telegrams = collect(stream);
        assert_eq!(telegrams.len(), 1);
        assert_eq!(telegrams[0].identifier, "MT382");
        assert_eq!(telegrams[0].electricity_delivered_1, None);
    }

    #[test]
    fn test_trailer_of_wrong_length_is_skipped() {
        let mut stream = ENERGY_PAYLOAD.as_bytes().to_vec();
        stream.extend_from_slice(b"ABCDE\r\n");
        stream.extend(frame(MINIMAL_PAYLOAD));

        let telegrams = collect(stream);
        assert_eq!(telegrams.len(), 1);
        assert_eq!(telegrams[0].identifier, "MT382");
    }

    #[test]
    fn test_lowercase_trailer_is_rejected() {
        // The comparison is case-sensitive, so a lowercased trailer must
        // fail. Pick a payload whose CRC contains a hex letter.
        let table = Table::new(DSMR_POLY);
        let mut stream = None;
        for i in 0..64 {
            let payload = format!("/ISk5MT{:03}\r\n\r\n!", i);
            let hex = format!("{:04x}", table.checksum(payload.as_bytes()));
            if hex.chars().any(|c| c.is_ascii_alphabetic()) {
                let mut bytes = payload.into_bytes();
                bytes.extend_from_slice(hex.as_bytes());
                bytes.extend_from_slice(b"\r\n");
                stream = Some(bytes);
                break;
            }
        }
        assert!(collect(stream.unwrap()).is_empty());
    }

    #[test]
    fn test_structurally_invalid_frame_is_dropped() {
        // Valid CRC, but a data line without '(' rejects the telegram.
        let mut stream = frame("/ISk5MT382\r\n\r\ngarbage-line\r\n!");
        stream.extend(frame(ENERGY_PAYLOAD));

        let telegrams = collect(stream);
        assert_eq!(telegrams.len(), 1);
        assert!(telegrams[0].electricity_delivered_1.is_some());
    }

    #[test]
    fn test_unknown_codes_do_not_reject_the_frame() {
        let stream = frame("/ISk5MT382\r\n\r\n9-9:99.99.99(abc)\r\n1-0:1.8.1(001234.567*kWh)\r\n!");
        let telegrams = collect(stream);
        assert_eq!(telegrams.len(), 1);
        assert!(telegrams[0].electricity_delivered_1.is_some());
        assert_eq!(
            telegrams[0].unrecognized.get("9-9:99.99.99").map(String::as_str),
            Some("abc")
        );
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let config = ReaderConfig {
            max_telegram_size: 32,
            ..ReaderConfig::default()
        };
        // A marker followed by far more than 32 bytes without terminator,
        // then a frame small enough to fit the bound.
        let mut stream = b"/".to_vec();
        stream.extend(std::iter::repeat(b'A').take(100));
        stream.extend(frame(MINIMAL_PAYLOAD));

        let telegrams: Vec<Telegram> =
            P1Reader::with_config(Cursor::new(stream), config).collect();
        assert_eq!(telegrams.len(), 1);
        assert_eq!(telegrams[0].identifier, "MT382");
    }

    #[test]
    fn test_reader_config_defaults_from_partial_input() {
        let config: ReaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_telegram_size, 16384);
        assert_eq!(config.channel_capacity, 10);

        let config: ReaderConfig =
            serde_json::from_str("{\"max_telegram_size\": 2048}").unwrap();
        assert_eq!(config.max_telegram_size, 2048);
        assert_eq!(config.channel_capacity, 10);
    }

    #[tokio::test]
    async fn test_poll_yields_telegrams_then_closes() {
        let mut stream = frame(ENERGY_PAYLOAD);
        stream.extend(frame(MINIMAL_PAYLOAD));

        let mut receiver = poll(Cursor::new(stream), ReaderConfig::default());

        let first = receiver.recv().await.expect("first telegram");
        assert!(first.electricity_delivered_1.is_some());
        let second = receiver.recv().await.expect("second telegram");
        assert_eq!(second.identifier, "MT382");

        // Input exhausted: the channel closes, no error, no more items.
        assert!(receiver.recv().await.is_none());
    }
}
