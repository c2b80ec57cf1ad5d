//! Decoding of Heart Rate Measurement characteristic frames (0x2A37).
//!
//! Frame layout:
//!
//! | Field           | Size (bytes) | Present when                       |
//! |-----------------|--------------|------------------------------------|
//! | flags           | 1            | always                             |
//! | heart rate      | 1 or 2 (LE)  | always; 2 bytes if flags bit 0 set |
//! | energy expended | 2 (LE)       | flags bit 3 set                    |
//! | R-R intervals   | 2 (LE) each  | flags bit 4 set, until exhausted   |
//!
//! R-R intervals are reported by the sensor in 1/1024 s ticks and converted
//! to seconds here.

use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Measurement {
    /// Wall clock time at which the frame was decoded.
    pub timestamp: DateTime<Utc>,
    /// Beats per minute.
    pub heart_rate: u16,
    /// Sensor-skin contact flag.
    pub contact_detected: bool,
    /// Cumulative energy expended in kilojoules, if the frame carried it.
    pub energy_expended: Option<u16>,
    /// R-R intervals in seconds, in arrival order. Empty if the frame
    /// carried none.
    pub rr_intervals: Vec<f64>,
}

/// Decode one notification frame into a [`Measurement`].
///
/// Flags bit 1 alone is treated as "contact detected"; the feature-supported
/// bit (bit 2) is ignored.
///
/// # Panics
///
/// Panics if `data` is shorter than the flags byte plus the heart rate value
/// it announces. The device link only delivers complete characteristic
/// values, so this is not reachable from a conformant sensor.
pub fn decode(data: &[u8]) -> Measurement {
    let flags = data[0];
    let is_16bit = flags & 0b0000_0001 != 0;
    let contact_detected = flags & 0b0000_0010 != 0;
    let energy_expended_present = flags & 0b0000_1000 != 0;
    let rr_intervals_present = flags & 0b0001_0000 != 0;

    let mut offset = 1;

    let heart_rate = if is_16bit {
        let value = u16::from_le_bytes([data[offset], data[offset + 1]]);
        offset += 2;
        value
    } else {
        let value = u16::from(data[offset]);
        offset += 1;
        value
    };

    let energy_expended = if energy_expended_present {
        let value = u16::from_le_bytes([data[offset], data[offset + 1]]);
        offset += 2;
        Some(value)
    } else {
        None
    };

    let mut rr_intervals = Vec::new();
    if rr_intervals_present {
        while offset + 1 < data.len() {
            let ticks = u16::from_le_bytes([data[offset], data[offset + 1]]);
            rr_intervals.push(f64::from(ticks) / 1024.0);
            offset += 2;
        }
    }

    Measurement {
        timestamp: Utc::now(),
        heart_rate,
        contact_detected,
        energy_expended,
        rr_intervals,
    }
}
