//! Scrubbing of registered secrets from caller-visible text.

use std::borrow::Cow;
use std::sync::Arc;

pub const REDACTED: &str = "[REDACTED]";

/// Replaces every registered secret with [`REDACTED`].
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// Longest first, so a secret containing another is replaced whole.
    secrets: Arc<[String]>,
}

impl Redactor {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self {
            secrets: secrets.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn redact<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let mut out = Cow::Borrowed(text);
        for secret in self.secrets.iter() {
            if out.contains(secret.as_str()) {
                out = Cow::Owned(out.replace(secret.as_str(), REDACTED));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_every_occurrence() {
        let redactor = Redactor::new(["key-123", "", "tenancy"]);
        assert_eq!(
            redactor.redact("bad key key-123 for tenancy (key-123)"),
            "bad key [REDACTED] for [REDACTED] ([REDACTED])"
        );
    }

    #[test]
    fn test_untouched_text_is_borrowed() {
        let redactor = Redactor::new(["secret"]);
        assert!(matches!(redactor.redact("all clear"), Cow::Borrowed(_)));
        assert!(Redactor::default().is_empty());
    }

    #[test]
    fn test_longer_secret_wins() {
        let redactor = Redactor::new(["abc", "abcdef"]);
        assert_eq!(redactor.redact("x=abcdef"), "x=[REDACTED]");
    }
}
