/// Renders a byte slice as a lowercase hex debug helper, the way the teacher
/// crate's `with_hex_fmt` annotates payload fields in `#[derive(Debug)]`
/// impls.
pub fn with_hex_fmt(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
