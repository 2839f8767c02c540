use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// URL-safe base64 of a string's UTF-8 bytes, without padding.
pub fn base64url(input: &str) -> String {
    URL_SAFE_NO_PAD.encode(input)
}
