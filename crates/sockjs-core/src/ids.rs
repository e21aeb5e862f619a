use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ProtocolError;

/// Client-supplied session identifier.
///
/// Opaque: the only structural rule is the one the URL layout imposes, a
/// non-empty path segment without `/` or `.`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw string without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `segment` can serve as a server or session path element.
    pub fn is_valid_segment(segment: &str) -> bool {
        !segment.is_empty() && !segment.contains(['/', '.'])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ProtocolError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid_segment(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(ProtocolError::UnknownSession)
        }
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_opaque_tokens() {
        let id: SessionId = "a1b2-c3_d4".parse().unwrap();
        assert_eq!(id.as_str(), "a1b2-c3_d4");
    }

    #[test]
    fn parse_rejects_empty_and_dotted() {
        assert!("".parse::<SessionId>().is_err());
        assert!("a.b".parse::<SessionId>().is_err());
        assert!("a/b".parse::<SessionId>().is_err());
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = SessionId::from_raw("xyz");
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::from_raw("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
