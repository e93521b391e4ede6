//! Security access key calculation

use crate::config::EcuKind;

/// Key for a 16-bit security access seed
pub fn calculate_key(kind: EcuKind, seed: u16) -> u16 {
    let rotated = seed.rotate_right(5);
    match kind {
        EcuKind::Trionic8Z22se => (rotated ^ 0x8142).wrapping_sub(0x2356),
        _ => rotated.wrapping_add(0xB988),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trionic8_key() {
        // 0x1234 rotated right by 5 is 0xA091
        assert_eq!(calculate_key(EcuKind::Trionic8, 0x1234), 0x5A19);
        assert_eq!(calculate_key(EcuKind::Trionic8Mcp, 0x1234), 0x5A19);
    }

    #[test]
    fn test_z22se_key() {
        // (0xA091 ^ 0x8142) - 0x2356
        assert_eq!(calculate_key(EcuKind::Trionic8Z22se, 0x1234), 0xFE7D);
    }

    #[test]
    fn test_zero_seed_wraps() {
        assert_eq!(calculate_key(EcuKind::Trionic8Z22se, 0), 0x8142u16.wrapping_sub(0x2356));
    }
}
