//! Quality policy: complexity score + viewing device -> JPEG quality factor
//!
//! ## Base quality
//!
//! | std-dev      | quality |
//! |--------------|---------|
//! | < 15         | 70      |
//! | [15, 30)     | 80      |
//! | [30, 45)     | 85      |
//! | >= 45        | 90      |
//!
//! ## Device adjustment
//!
//! The delta is applied first, then the result is clamped:
//!
//! | device      | delta | floor | ceiling |
//! |-------------|-------|-------|---------|
//! | iPhone      | -10   | 65    |         |
//! | iPad        | -5    | 70    |         |
//! | Display     | +5    |       | 95      |
//! | Unspecified | 0     |       |         |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OptimError;

/// Intended viewing target for the converted JPEG
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    IPhone,
    IPad,
    Display,
    #[default]
    Unspecified,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::IPhone => "iphone",
            DeviceClass::IPad => "ipad",
            DeviceClass::Display => "display",
            DeviceClass::Unspecified => "unspecified",
        }
    }

    /// (delta, floor, ceiling) applied on top of the base quality
    fn adjustment(&self) -> (i32, Option<i32>, Option<i32>) {
        match self {
            DeviceClass::IPhone => (-10, Some(65), None),
            DeviceClass::IPad => (-5, Some(70), None),
            DeviceClass::Display => (5, None, Some(95)),
            DeviceClass::Unspecified => (0, None, None),
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = OptimError;

    /// Case-insensitive. Anything other than the three device names is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iphone" => Ok(DeviceClass::IPhone),
            "ipad" => Ok(DeviceClass::IPad),
            "display" => Ok(DeviceClass::Display),
            _ => Err(OptimError::UnknownDevice(s.to_string())),
        }
    }
}

/// Base quality from the four-band step function. A score exactly on a band
/// boundary takes the higher band.
pub fn base_quality(score: f64) -> u8 {
    if score < 15.0 {
        70
    } else if score < 30.0 {
        80
    } else if score < 45.0 {
        85
    } else {
        90
    }
}

/// Final quality factor for `score` viewed on `device`.
pub fn select_quality(score: f64, device: DeviceClass) -> u8 {
    let base = base_quality(score) as i32;
    let (delta, floor, ceiling) = device.adjustment();

    let mut quality = base + delta;
    if let Some(floor) = floor {
        quality = quality.max(floor);
    }
    if let Some(ceiling) = ceiling {
        quality = quality.min(ceiling);
    }

    quality.clamp(0, 100) as u8
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn device_strategy() -> impl Strategy<Value = DeviceClass> {
        prop_oneof![
            Just(DeviceClass::IPhone),
            Just(DeviceClass::IPad),
            Just(DeviceClass::Display),
            Just(DeviceClass::Unspecified),
        ]
    }

    proptest! {
        /// Property: quality never decreases as complexity grows.
        #[test]
        fn prop_monotonic_in_score(
            a in 0.0f64..128.0,
            b in 0.0f64..128.0,
            device in device_strategy(),
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(select_quality(lo, device) <= select_quality(hi, device));
        }

        /// Property: iPhone <= iPad <= Display for any score.
        #[test]
        fn prop_device_ordering(score in 0.0f64..128.0) {
            let iphone = select_quality(score, DeviceClass::IPhone);
            let ipad = select_quality(score, DeviceClass::IPad);
            let display = select_quality(score, DeviceClass::Display);
            prop_assert!(iphone <= ipad, "iphone={} ipad={}", iphone, ipad);
            prop_assert!(ipad <= display, "ipad={} display={}", ipad, display);
        }

        /// Property: output stays in [65, 95], and in [70, 90] without a device.
        #[test]
        fn prop_output_bounds(score in -10.0f64..1000.0, device in device_strategy()) {
            let q = select_quality(score, device);
            prop_assert!((65..=95).contains(&q));

            let unspecified = select_quality(score, DeviceClass::Unspecified);
            prop_assert!((70..=90).contains(&unspecified));
        }
    }
}
