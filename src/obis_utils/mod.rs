use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref OBIS_DESCRIPTIONS: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();

        // Timestamp and identification
        map.insert("0-0:1.0.0", "Date and time");
        map.insert("0-0:96.1.1", "Electricity equipment identifier");
        map.insert("1-3:0.2.8", "DSMR version");
        map.insert("0-0:96.14.0", "Electricity tariff indicator");

        // Energy values
        map.insert("1-0:1.8.1", "Electricity delivered to client (tariff 1)");
        map.insert("1-0:1.8.2", "Electricity delivered to client (tariff 2)");
        map.insert("1-0:2.8.1", "Electricity delivered by client (tariff 1)");
        map.insert("1-0:2.8.2", "Electricity delivered by client (tariff 2)");

        // Power values
        map.insert("1-0:1.7.0", "Actual electricity power delivered");
        map.insert("1-0:2.7.0", "Actual electricity power received");
        map.insert("1-0:21.7.0", "Active power delivered (L1)");
        map.insert("1-0:41.7.0", "Active power delivered (L2)");
        map.insert("1-0:61.7.0", "Active power delivered (L3)");
        map.insert("1-0:22.7.0", "Instantaneous active power (L1)");
        map.insert("1-0:42.7.0", "Instantaneous active power (L2)");
        map.insert("1-0:62.7.0", "Instantaneous active power (L3)");

        // Current values
        map.insert("1-0:31.7.0", "Instantaneous current (L1)");
        map.insert("1-0:51.7.0", "Instantaneous current (L2)");
        map.insert("1-0:71.7.0", "Instantaneous current (L3)");

        // Power quality counters
        map.insert("0-0:96.7.21", "Number of power failures in any phase");
        map.insert("0-0:96.7.9", "Number of long power failures in any phase");
        map.insert("1-0:32.32.0", "Number of voltage sags (L1)");
        map.insert("1-0:52.32.0", "Number of voltage sags (L2)");
        map.insert("1-0:72.32.0", "Number of voltage sags (L3)");
        map.insert("1-0:32.36.0", "Number of voltage swells (L1)");
        map.insert("1-0:52.36.0", "Number of voltage swells (L2)");
        map.insert("1-0:72.36.0", "Number of voltage swells (L3)");

        // Gas meter
        map.insert("0-1:96.1.0", "Gas equipment identifier");
        map.insert("0-1:24.2.1", "Gas delivered to client");

        map
    };
}

pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    return OBIS_DESCRIPTIONS.get(obis_code).copied();
}

/// Structural check for `A-B:C.D.E` ID-codes as dutch meters transmit
/// them. Telegrams are never rejected on this; it only grades how data
/// lines with unknown codes are reported.
pub fn validate_obis_code(code: &str) -> bool {
    let parts: Vec<&str> = code.split(':').collect();
    if parts.len() != 2 {
        return false;
    }

    // Check the A-B (medium-channel) part
    let ab_parts: Vec<&str> = parts[0].split('-').collect();
    if ab_parts.len() != 2 {
        return false;
    }

    // Check the C.D.E part
    let cde_parts: Vec<&str> = parts[1].split('.').collect();
    if cde_parts.len() != 3 {
        return false;
    }

    // Validate that all parts are numeric
    for part in ab_parts.iter().chain(cde_parts.iter()) {
        if part.parse::<u8>().is_err() {
            return false;
        }
    }

    return true;
}
