//! Rate-limited replay of captured P1 output.
//!
//! A real meter emits one telegram every few seconds; a capture file read
//! back at full speed behaves nothing like that. [`RateLimitedReader`]
//! wraps any byte source and paces delivery so that data starting at a
//! telegram marker is released at most once per interval. It knows nothing
//! about the protocol beyond the marker byte, so it can sit in front of
//! [`crate::reader::P1Reader`] in tests and simulations.

use std::io::{BufRead, BufReader, Read};
use std::time::{Duration, Instant};

const TELEGRAM_MARKER: u8 = b'/';

pub struct RateLimitedReader<R: Read> {
    input: BufReader<R>,
    interval: Duration,
    last_release: Option<Instant>,
}

impl<R: Read> RateLimitedReader<R> {
    /// Wrap `input`, releasing at most one telegram per `interval`.
    /// Typically `input` is a `File` holding saved meter output and the
    /// interval mimics the meter's transmission rate.
    pub fn new(input: R, interval: Duration) -> Self {
        return RateLimitedReader {
            input: BufReader::new(input),
            interval,
            last_release: None,
        };
    }

    fn wait_for_slot(&mut self) {
        if let Some(last) = self.last_release {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_release = Some(Instant::now());
    }
}

impl<R: Read> Read for RateLimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (count, at_marker) = {
            let available = self.input.fill_buf()?;
            if available.is_empty() {
                return Ok(0);
            }
            let window = &available[..available.len().min(buf.len())];

            match window.iter().position(|&b| b == TELEGRAM_MARKER) {
                // No telegram boundary in sight, pass the bytes through.
                None => {
                    buf[..window.len()].copy_from_slice(window);
                    (window.len(), false)
                }
                // A marker is coming up: first drain the bytes before it.
                Some(marker) if marker > 0 => {
                    buf[..marker].copy_from_slice(&window[..marker]);
                    (marker, false)
                }
                // Positioned on a marker: release up to the next one, so
                // the following read pauses at the next telegram again.
                Some(_) => {
                    let end = window[1..]
                        .iter()
                        .position(|&b| b == TELEGRAM_MARKER)
                        .map(|i| i + 1)
                        .unwrap_or(window.len());
                    buf[..end].copy_from_slice(&window[..end]);
                    (end, true)
                }
            }
        };

        if at_marker {
            self.wait_for_slot();
        }
        self.input.consume(count);
        return Ok(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CAPTURE: &[u8] = b"/ISk5MT382\r\n\r\n1-0:1.8.1(000001.000*kWh)\r\n!0000\r\n/ISk5MT382\r\n\r\n1-0:1.8.1(000002.000*kWh)\r\n!0000\r\n";

    #[test]
    fn test_delivers_capture_unchanged() {
        let mut reader = RateLimitedReader::new(Cursor::new(CAPTURE), Duration::from_millis(1));
        let mut replayed = Vec::new();
        reader.read_to_end(&mut replayed).unwrap();
        assert_eq!(replayed, CAPTURE);
    }

    #[test]
    fn test_paces_on_telegram_markers() {
        let interval = Duration::from_millis(20);
        let mut reader = RateLimitedReader::new(Cursor::new(CAPTURE), interval);

        let start = Instant::now();
        let mut replayed = Vec::new();
        reader.read_to_end(&mut replayed).unwrap();

        // First telegram is released immediately, the second waits a slot.
        assert!(start.elapsed() >= interval);
        assert_eq!(replayed, CAPTURE);
    }

    #[test]
    fn test_replays_a_capture_file_into_the_reader() {
        use crate::crc::{Table, DSMR_POLY};
        use crate::reader::P1Reader;
        use std::io::{Seek, SeekFrom, Write};

        let table = Table::new(DSMR_POLY);
        let mut capture = Vec::new();
        for reading in ["000001.000", "000002.000"] {
            let payload = format!("/ISk5MT382\r\n\r\n1-0:1.8.1({}*kWh)\r\n!", reading);
            capture.extend_from_slice(payload.as_bytes());
            let crc = table.checksum(payload.as_bytes());
            capture.extend_from_slice(format!("{:04X}\r\n", crc).as_bytes());
        }

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&capture).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let replay = RateLimitedReader::new(file, Duration::from_millis(1));
        let telegrams: Vec<_> = P1Reader::new(replay).collect();
        assert_eq!(telegrams.len(), 2);
        assert_eq!(
            telegrams[1].electricity_delivered_1.as_ref().unwrap().value,
            2000.0
        );
    }

    #[test]
    fn test_short_destination_buffers() {
        let mut reader = RateLimitedReader::new(Cursor::new(CAPTURE), Duration::from_millis(1));
        let mut replayed = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            replayed.extend_from_slice(&buf[..n]);
        }
        assert_eq!(replayed, CAPTURE);
    }
}
