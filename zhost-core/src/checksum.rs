//! Checksum helpers for the Serial API wire format.

/// Computes the XOR checksum used by Serial API data frames: start at
/// `0xFF` and XOR every byte of `data` into it.
pub fn xor_sum(data: &[u8]) -> u8 {
    data.iter().fold(0xff, |acc, b| acc ^ b)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_xor_sum() {
        let input = hex::decode("030002").unwrap();
        assert_eq!(xor_sum(&input), 0xfe);
    }

    #[test]
    fn test_xor_sum_empty() {
        assert_eq!(xor_sum(&[]), 0xff);
    }
}
