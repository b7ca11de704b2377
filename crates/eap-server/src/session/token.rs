use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use std::fmt;

/// Opaque correlation value carried in the RADIUS State attribute.
///
/// Minted once per conversation and echoed back by the NAS on every
/// subsequent Access-Request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Random bytes behind a minted token
    pub const RAW_LENGTH: usize = 16;
    /// Longest token that still fits in one attribute
    pub const MAX_LENGTH: usize = 253;

    pub fn generate() -> Self {
        let mut raw = [0u8; Self::RAW_LENGTH];
        rand::rng().fill(&mut raw);
        SessionToken(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Token echoed in a State attribute. `None` for empty, oversized or
    /// non-UTF-8 values, which start a new conversation instead.
    pub fn from_state(value: &[u8]) -> Option<Self> {
        if value.is_empty() || value.len() > Self::MAX_LENGTH {
            return None;
        }
        std::str::from_utf8(value)
            .ok()
            .map(|s| SessionToken(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
