//! Decimal places of scaled values
//!
//! A raw integer times a scale like 0.1 comes out as 13.000000001. Decoded
//! values are rounded to the decimals their scale and offset can express.

/// Cap for scales that never become integral (e.g. 1/3)
const MAX_DECIMALS: u8 = 6;

/// Used when the scale carries no information
const FALLBACK_DECIMALS: u8 = 4;

/// Decimals needed to show every value `raw * scale + offset` exactly
pub fn default_decimals(scale: f64, offset: f64) -> u8 {
    if scale == 0.0 || !scale.is_finite() {
        return FALLBACK_DECIMALS;
    }
    if !offset.is_finite() {
        return decimal_places(scale);
    }
    decimal_places(scale).max(decimal_places(offset))
}

fn decimal_places(value: f64) -> u8 {
    let value = value.abs();
    (0..=MAX_DECIMALS)
        .find(|&decimals| {
            let shifted = value * 10_f64.powi(i32::from(decimals));
            (shifted - shifted.round()).abs() < 1e-9
        })
        .unwrap_or(MAX_DECIMALS)
}

pub fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10_f64.powi(i32::from(decimals));
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimals_from_scale() {
        let cases = [
            (1.0, 0),
            (-1.0, 0),
            (16.0, 0),
            (0.1, 1),
            (1.5, 1),
            (0.25, 2),
            (0.01, 2),
            (0.001, 3),
            (0.0, FALLBACK_DECIMALS),
            (1.0 / 3.0, MAX_DECIMALS),
        ];
        for (scale, decimals) in cases {
            assert_eq!(default_decimals(scale, 0.0), decimals, "scale {}", scale);
        }
    }

    #[test]
    fn test_fractional_offset_widens_precision() {
        assert_eq!(default_decimals(1.0, -0.5), 1);
        assert_eq!(default_decimals(0.1, -40.25), 2);
        assert_eq!(default_decimals(0.01, -40.5), 2);
        assert_eq!(default_decimals(1.0, -40.0), 0);
        assert_eq!(default_decimals(0.0, -0.5), FALLBACK_DECIMALS);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(-12.300000000001, 1), -12.3);
        assert_eq!(round_to(849.6, 0), 850.0);
        assert_eq!(round_to(0.0625, 2), 0.06);
    }
}
