use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub mod structs;
pub mod utils;

use structs::{GasMeterValue, Timestamp, Value};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("unexpected too few lines in telegram")]
    TooFewLines,
    #[error("expected '/' missing in first line of telegram")]
    MissingStartMarker,
    #[error("missing separating new line (CR+LF) between identifier and data in telegram")]
    MissingHeaderSeparator,
    #[error("expected '(' not found on line {0}")]
    MissingValueDelimiter(usize),
    #[error("not a parsable number: {0}")]
    InvalidNumber(String),
    #[error("expected a value and a unit: {0}")]
    MalformedValueWithUnit(String),
    #[error("gas meter reading did not parse: {0}")]
    MalformedGasReading(String),
    #[error("parsing timestamp: missing DST indicator: {0}")]
    MissingDstIndicator(String),
    #[error("invalid timestamp format: {0}")]
    InvalidTimestampFormat(String),
}

/// One complete P1 telegram, decoded. Constructed only from a frame that
/// already passed the CRC check and all structural checks; a telegram is
/// never handed out partially populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telegram {
    /// Device model string from the telegram header.
    pub identifier: String,

    // Readings that change with every transmission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_equipment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_delivered_1: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_returned_1: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_delivered_2: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_returned_2: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_currently_delivered: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_currently_returned: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_currently_delivered_l1: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_currently_delivered_l2: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_currently_delivered_l3: Option<Value>,

    // Mostly static data, only the latest reading is interesting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsmr_version: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_tariff: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_failure_count: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_power_failure_count: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instantaneous_current_l1: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instantaneous_current_l2: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instantaneous_current_l3: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instantaneous_active_power_l1: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instantaneous_active_power_l2: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instantaneous_active_power_l3: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_sag_count_l1: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_sag_count_l2: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_sag_count_l3: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_swell_count_l1: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_swell_count_l2: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_swell_count_l3: Option<Value>,

    // Gas meter information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_equipment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_delivered: Option<GasMeterValue>,

    /// Well-formed data lines whose ID-code is not in the known-code table.
    /// Kept raw instead of rejecting the telegram, so newer meters keep
    /// working against this parser.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub unrecognized: HashMap<String, String>,
}

impl Telegram {
    /// Statically declared association between the known ID-codes, the
    /// decoder for each and the field it populates. A decoder failure on a
    /// known code fails the whole telegram.
    fn apply(&mut self, code: &str, raw: &str) -> Result<(), TelegramError> {
        match code {
            "0-0:1.0.0" => self.timestamp = Some(utils::parse_timestamp(raw)?),
            "0-0:96.1.1" => self.electricity_equipment_id = Some(raw.to_string()),
            "1-0:1.8.1" => self.electricity_delivered_1 = Some(utils::parse_value(raw)?),
            "1-0:2.8.1" => self.electricity_returned_1 = Some(utils::parse_value(raw)?),
            "1-0:1.8.2" => self.electricity_delivered_2 = Some(utils::parse_value(raw)?),
            "1-0:2.8.2" => self.electricity_returned_2 = Some(utils::parse_value(raw)?),
            "1-0:1.7.0" => self.electricity_currently_delivered = Some(utils::parse_value(raw)?),
            "1-0:2.7.0" => self.electricity_currently_returned = Some(utils::parse_value(raw)?),
            "1-0:21.7.0" => self.phase_currently_delivered_l1 = Some(utils::parse_value(raw)?),
            "1-0:41.7.0" => self.phase_currently_delivered_l2 = Some(utils::parse_value(raw)?),
            "1-0:61.7.0" => self.phase_currently_delivered_l3 = Some(utils::parse_value(raw)?),
            "1-3:0.2.8" => self.dsmr_version = Some(utils::parse_value(raw)?),
            "0-0:96.14.0" => self.electricity_tariff = Some(utils::parse_value(raw)?),
            "0-0:96.7.21" => self.power_failure_count = Some(utils::parse_value(raw)?),
            "0-0:96.7.9" => self.long_power_failure_count = Some(utils::parse_value(raw)?),
            "1-0:31.7.0" => self.instantaneous_current_l1 = Some(utils::parse_value(raw)?),
            "1-0:51.7.0" => self.instantaneous_current_l2 = Some(utils::parse_value(raw)?),
            "1-0:71.7.0" => self.instantaneous_current_l3 = Some(utils::parse_value(raw)?),
            "1-0:22.7.0" => self.instantaneous_active_power_l1 = Some(utils::parse_value(raw)?),
            "1-0:42.7.0" => self.instantaneous_active_power_l2 = Some(utils::parse_value(raw)?),
            "1-0:62.7.0" => self.instantaneous_active_power_l3 = Some(utils::parse_value(raw)?),
            "1-0:32.32.0" => self.voltage_sag_count_l1 = Some(utils::parse_value(raw)?),
            "1-0:52.32.0" => self.voltage_sag_count_l2 = Some(utils::parse_value(raw)?),
            "1-0:72.32.0" => self.voltage_sag_count_l3 = Some(utils::parse_value(raw)?),
            "1-0:32.36.0" => self.voltage_swell_count_l1 = Some(utils::parse_value(raw)?),
            "1-0:52.36.0" => self.voltage_swell_count_l2 = Some(utils::parse_value(raw)?),
            "1-0:72.36.0" => self.voltage_swell_count_l3 = Some(utils::parse_value(raw)?),
            "0-1:96.1.0" => self.gas_equipment_id = Some(raw.to_string()),
            "0-1:24.2.1" => self.gas_delivered = Some(utils::parse_gas_value(raw)?),
            _ => {
                if crate::obis_utils::validate_obis_code(code) {
                    debug!("retaining unrecognized ID-code {}", code);
                } else {
                    warn!("retaining data line with malformed ID-code {}", code);
                }
                self.unrecognized.insert(code.to_string(), raw.to_string());
            }
        }
        return Ok(());
    }
}

/// Parse a verified telegram payload (the bytes from '/' through '!').
///
/// The payload is expected to have already passed the CRC check; this
/// function only validates the structural envelope and decodes the data
/// lines into a [`Telegram`].
pub fn parse_telegram(data: &[u8]) -> Result<Telegram, TelegramError> {
    let text = String::from_utf8_lossy(data);
    let lines: Vec<&str> = text.split("\r\n").collect();

    if lines.len() < 2 {
        return Err(TelegramError::TooFewLines);
    }
    if !lines[0].starts_with('/') {
        return Err(TelegramError::MissingStartMarker);
    }
    if !lines[1].is_empty() {
        return Err(TelegramError::MissingHeaderSeparator);
    }

    // The telegram starts with "/XXXZ Ident CR LF CR LF", followed by the
    // data lines. The identifier runs from right after the 5-byte prefix
    // up to the double newline.
    let header_end = text
        .find("\r\n\r\n")
        .ok_or(TelegramError::MissingHeaderSeparator)?;
    let identifier = text
        .get(5..header_end)
        .ok_or(TelegramError::MissingStartMarker)?
        .to_string();

    // Data lines sit strictly between the header block and the final '!'
    // line. Duplicated ID-codes overwrite, last occurrence wins.
    let mut values: HashMap<&str, &str> = HashMap::new();
    for (index, line) in lines[2..lines.len() - 1].iter().enumerate() {
        let id_code_end = line
            .find('(')
            .ok_or(TelegramError::MissingValueDelimiter(index))?;
        let raw = line
            .get(id_code_end + 1..line.len() - 1)
            .ok_or(TelegramError::MissingValueDelimiter(index))?;
        values.insert(&line[..id_code_end], raw);
    }

    let mut telegram = Telegram {
        identifier,
        ..Default::default()
    };
    for (code, raw) in values {
        telegram.apply(code, raw)?;
    }
    return Ok(telegram);
}
