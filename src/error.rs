//! Caller-visible error type.

use alloc::string::String;

/// Why a `send` call did not complete with `OK`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AtError {
    /// The peripheral answered `ERROR`.
    Error,

    /// The peripheral answered `+CME ERROR`; the text after the prefix is
    /// carried verbatim.
    Cme(String),

    /// No terminal line arrived within the caller's timeout.
    Timeout,
}

impl AtError {
    /// Short identifier for log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            AtError::Error => "error",
            AtError::Cme(_) => "cme_error",
            AtError::Timeout => "timeout",
        }
    }
}

impl core::fmt::Display for AtError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AtError::Cme(text) if !text.is_empty() => write!(f, "cme_error:{}", text),
            _ => f.write_str(self.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display_includes_cme_text() {
        assert_eq!(AtError::Error.to_string(), "error");
        assert_eq!(AtError::Timeout.to_string(), "timeout");
        assert_eq!(AtError::Cme(" 100".to_string()).to_string(), "cme_error: 100");
        assert_eq!(AtError::Cme(String::new()).to_string(), "cme_error");
    }
}
