//! Library for reading and parsing data from the P1 port of dutch smart
//! meters.
//!
//! The meter pushes a telegram every few seconds: an ASCII frame opened by
//! '/', closed by '!' and protected by a CRC-16 trailer. This crate finds
//! those frames in an unbounded byte stream, verifies them and decodes the
//! `ID-code(value)` data lines into a typed [`Telegram`].
//!
//! ```no_run
//! use std::fs::File;
//!
//! let port = File::open("/dev/ttyUSB0").unwrap();
//! for telegram in dsmr_p1::P1Reader::new(port) {
//!     if let Some(power) = telegram.electricity_currently_delivered {
//!         println!("drawing {} {}", power.value, power.unit);
//!     }
//! }
//! ```
//!
//! Async consumers can use [`poll`] instead, which runs the scan loop on
//! the blocking pool and hands out a bounded channel of telegrams.

pub mod crc;
pub mod obis_utils;
pub mod reader;
pub mod replay;
pub mod telegram;

// Re-export common types for easier access
pub use reader::{poll, FramingError, P1Reader, ReaderConfig};
pub use replay::RateLimitedReader;
pub use telegram::structs::{GasMeterValue, Timestamp, Value};
pub use telegram::{parse_telegram, Telegram, TelegramError};
