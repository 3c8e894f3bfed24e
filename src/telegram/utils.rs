use super::structs::{GasMeterValue, Timestamp, Value};
use super::TelegramError;
use chrono::{FixedOffset, NaiveDateTime, TimeZone};

/* All dutch smart meters report wall-clock time in the same timezone:
   CEST while DST is active, CET otherwise. The telegram itself says which
   one applies, so the offset is taken from the indicator and never derived
   from calendar rules. */
const SUMMER_UTC_OFFSET_SECS: i32 = 2 * 3600;
const WINTER_UTC_OFFSET_SECS: i32 = 3600;

/// Parse a raw value token into a float and a unit.
///
/// Example formats:
/// `000123.456*kWh` -> 123456.0 "Wh"
/// `00002` -> 2.0 "" (bare counts carry no unit)
///
/// If the unit starts with "k" the value is multiplied by 1000 and the "k"
/// is removed from the unit.
pub fn parse_value(input: &str) -> Result<Value, TelegramError> {
    let parts: Vec<&str> = input.split('*').collect();
    if parts.len() > 2 {
        return Err(TelegramError::MalformedValueWithUnit(input.to_string()));
    }

    let mut value: f64 = parts[0]
        .parse()
        .map_err(|_| TelegramError::InvalidNumber(parts[0].to_string()))?;

    let mut unit = match parts.len() {
        2 => parts[1].to_string(),
        _ => String::new(),
    };
    if let Some(stripped) = unit.strip_prefix('k') {
        value *= 1000.0;
        unit = stripped.to_string();
    }

    return Ok(Value { value, unit });
}

/// Parse a timestamp token of the form `YYMMDDhhmmssX`.
///
/// The value used for X determines whether DST is active: S (summer)
/// selects the CEST offset, W (winter) the CET offset.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TelegramError> {
    let indicator = match input.chars().last() {
        Some(c) => c,
        None => return Err(TelegramError::InvalidTimestampFormat(input.to_string())),
    };

    let offset_secs = match indicator {
        'S' => SUMMER_UTC_OFFSET_SECS,
        'W' => WINTER_UTC_OFFSET_SECS,
        _ => return Err(TelegramError::MissingDstIndicator(input.to_string())),
    };

    let digits = &input[..input.len() - 1];
    let naive = NaiveDateTime::parse_from_str(digits, "%y%m%d%H%M%S")
        .map_err(|_| TelegramError::InvalidTimestampFormat(input.to_string()))?;

    let offset = FixedOffset::east_opt(offset_secs).unwrap();
    let ts = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| TelegramError::InvalidTimestampFormat(input.to_string()))?;

    return Ok(Timestamp(ts));
}

/// Parse a gas meter token: two sub-tokens joined by the literal `)(`
/// sequence, e.g. `101209112500W)(12785.123*m3` — the capture timestamp
/// followed by the meter reading.
pub fn parse_gas_value(input: &str) -> Result<GasMeterValue, TelegramError> {
    let parts: Vec<&str> = input.split(")(").collect();
    if parts.len() != 2 {
        return Err(TelegramError::MalformedGasReading(input.to_string()));
    }

    let timestamp = parse_timestamp(parts[0])?;
    let value = parse_value(parts[1])?;
    return Ok(GasMeterValue { timestamp, value });
}
