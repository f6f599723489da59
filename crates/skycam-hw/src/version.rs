//! SDK and firmware version decoding.

use std::fmt;

use serde::Serialize;

/// The four components reported by `GetQHYCCDSDKVersion`.
///
/// The vendor reports the year as two digits (`24` for 2024).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SdkVersion {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub subversion: u32,
}

impl SdkVersion {
    pub fn to_array(self) -> [u32; 4] {
        [self.year, self.month, self.day, self.subversion]
    }
}

/// Renders as `V20YYMMDD_S`, month and day always two digits.
impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V20{}{:02}{:02}_{}",
            self.year, self.month, self.day, self.subversion
        )
    }
}

/// Firmware build date decoded from the `GetQHYCCDFWVersion` buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    /// Full year, e.g. 2019.
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

impl FirmwareVersion {
    /// The high nibble of byte 0 is the year offset; values up to 9 are
    /// shifted by 16 (firmware from 2016 onwards). The low nibble is the
    /// month and byte 1 the day.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let (&b0, &b1) = (buf.first()?, buf.get(1)?);
        let high = u32::from(b0 >> 4);
        let year = if high <= 9 { high + 0x10 } else { high };
        Some(Self {
            year: 2000 + year,
            month: u32::from(b0 & 0x0f),
            day: u32::from(b1),
        })
    }

    pub fn to_array(self) -> [u32; 3] {
        [self.year, self.month, self.day]
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.year, self.month, self.day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(month: u32, day: u32) -> SdkVersion {
        SdkVersion {
            year: 24,
            month,
            day,
            subversion: 7,
        }
    }

    #[test]
    fn single_digit_month_and_day_are_padded() {
        assert_eq!(v(3, 5).to_string(), "V20240305_7");
    }

    #[test]
    fn single_digit_month_two_digit_day() {
        assert_eq!(v(3, 15).to_string(), "V20240315_7");
    }

    #[test]
    fn two_digit_month_single_digit_day() {
        assert_eq!(v(11, 5).to_string(), "V20241105_7");
    }

    #[test]
    fn two_digit_month_and_day_unchanged() {
        assert_eq!(v(12, 31).to_string(), "V20241231_7");
    }

    #[test]
    fn to_array_keeps_vendor_order() {
        assert_eq!(v(1, 2).to_array(), [24, 1, 2, 7]);
    }

    #[test]
    fn firmware_low_year_nibble_is_shifted() {
        // 0x35: year nibble 3 -> 2019, month 5
        let fw = FirmwareVersion::decode(&[0x35, 21]).unwrap();
        assert_eq!(fw, FirmwareVersion { year: 2019, month: 5, day: 21 });
        assert_eq!(fw.to_string(), "2019_5_21");
    }

    #[test]
    fn firmware_high_year_nibble_is_literal() {
        let fw = FirmwareVersion::decode(&[0xA2, 3]).unwrap();
        assert_eq!(fw.year, 2010);
        assert_eq!(fw.month, 2);
        assert_eq!(fw.day, 3);
    }

    #[test]
    fn firmware_short_buffer() {
        assert!(FirmwareVersion::decode(&[0x35]).is_none());
    }
}
