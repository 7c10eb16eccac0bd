use std::time;

/// Get the current system time in epoch format.
///
/// # Returns
///
/// Current system time in seconds from epoch.
///
/// # Panics
///
/// Panics if the system time is before epoch.
pub fn now_from_epoch() -> u64 {
    time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .expect("system time is before epoch")
        .as_secs()
}

/// Dumps a byte slice as a lowercase hexadecimal string.
///
/// The output is exact-width: two hex characters per input byte,
/// zero-padded. This rendering is part of the scrobbler signature
/// contract and must not change.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Parses a hexadecimal string back into bytes.
///
/// Accepts upper and lower case digits. Returns `None` for an odd-length
/// string or any non-hex character.
#[must_use]
pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }

    text.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            u8::try_from((hi << 4) | lo).ok()
        })
        .collect()
}

/// Parses exactly 32 hex characters into a 16-byte key.
#[must_use]
pub fn hex_decode_key(text: &str) -> Option<[u8; 16]> {
    let bytes = hex_decode(text)?;
    bytes.try_into().ok()
}
