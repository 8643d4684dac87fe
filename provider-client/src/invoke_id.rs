//! Invoke identifiers carried in every frame header.

use std::fmt;
use std::str::FromStr;

use crate::error::ProviderError;

/// Correlation token tagging one request/response pair on the connection.
///
/// Always rendered as four zero-padded ASCII digits. The highest value,
/// [`InvokeId::UNSOLICITED`], is reserved by the provider for events that
/// are not answers to any request.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct InvokeId(u16);

impl InvokeId {
    /// Largest representable id.
    pub const MAX: u16 = 9999;

    /// First id handed out after the counter wraps.
    pub const ZERO: InvokeId = InvokeId(0);

    /// Sentinel used for provider-initiated (unsolicited) events.
    pub const UNSOLICITED: InvokeId = InvokeId(Self::MAX);

    /// Create an invoke id, returning `None` if the value needs more than four digits.
    pub fn new(value: u16) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    /// Numeric value of the id.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Whether this id marks an unsolicited event.
    pub fn is_unsolicited(&self) -> bool {
        *self == Self::UNSOLICITED
    }

    /// The four ASCII bytes written into the frame header.
    pub fn to_header_bytes(&self) -> [u8; 4] {
        let mut out = [b'0'; 4];
        let mut value = self.0;
        for slot in out.iter_mut().rev() {
            *slot = b'0' + (value % 10) as u8;
            value /= 10;
        }
        out
    }

    /// Parse the four header bytes.
    pub fn from_header_bytes(bytes: &[u8]) -> Result<Self, ProviderError> {
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(ProviderError::InvalidInvokeId(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        }
        let value = bytes
            .iter()
            .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));
        Ok(Self(value))
    }
}

impl fmt::Display for InvokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for InvokeId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_header_bytes(s.as_bytes())
    }
}
