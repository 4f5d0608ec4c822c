//! CRC-16/GENIBUS, the checksum that guards the game configuration record.
//!
//! Parameters: polynomial `0x1021`, initial value `0xFFFF`, no input or output
//! reflection, final XOR `0xFFFF`.  This is CRC-16/CCITT-FALSE with the result
//! inverted.

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;
const XOR_OUT: u16 = 0xFFFF;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Computes CRC-16/GENIBUS over `data`.
///
/// ```rust
/// assert_eq!(buzzer_core::protocol::crc::crc16_genibus(b"123456789"), 0xD64E);
/// ```
pub fn crc16_genibus(data: &[u8]) -> u16 {
    let crc = data.iter().fold(INIT, |crc, &byte| {
        let index = ((crc >> 8) ^ byte as u16) & 0xFF;
        (crc << 8) ^ TABLE[index as usize]
    });
    crc ^ XOR_OUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value_matches_catalogue() {
        assert_eq!(crc16_genibus(b"123456789"), 0xD64E);
    }

    #[test]
    fn test_empty_input_is_inverted_init() {
        assert_eq!(crc16_genibus(&[]), 0x0000);
    }

    #[test]
    fn test_single_bit_flip_changes_checksum() {
        let a = crc16_genibus(&[0x10, 0x27, 0x00, 0x00, 0x01, 0x00, 0x01]);
        let b = crc16_genibus(&[0x10, 0x27, 0x00, 0x00, 0x01, 0x00, 0x00]);
        assert_ne!(a, b);
    }
}
