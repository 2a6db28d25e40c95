//! Stage 3 pattern scanning over decoded samples.

use latent_align_core::{AlignError, Result};
use regex::{RegexSet, RegexSetBuilder};

/// Known jailbreak / prompt-injection phrasings, matched case-insensitively.
pub const BUILTIN_PATTERNS: &[&str] = &[
    r"ignore\s+(all\s+)?(the\s+)?(previous|prior|above)\s+(instructions|prompts|rules)",
    r"disregard\s+(all\s+|the\s+|your\s+)?(system|previous|prior)\s+(prompt|instructions)",
    r"you\s+are\s+now\s+(dan|jailbroken|in\s+developer\s+mode)",
    r"do\s+anything\s+now",
    r"(reveal|print|show|repeat)\s+(me\s+)?(your|the)\s+(system|hidden)\s+prompt",
    r"pretend\s+(that\s+)?(you\s+have|there\s+are)\s+no\s+(rules|restrictions|guidelines)",
    r"bypass\s+(the\s+|your\s+)?(safety|content)\s+(filters?|polic(y|ies)|guidelines)",
    r"<\s*/?\s*(system|im_start|im_end)\s*>",
    r"\[\s*(system|inst)\s*\]",
];

/// Compiled pattern set used to scan decoder output.
#[derive(Debug, Clone)]
pub struct PatternScanner {
    set: RegexSet,
}

impl PatternScanner {
    /// Built-in patterns plus `extra`.
    ///
    /// # Errors
    /// `AlignError::Validation` if any extra pattern fails to compile.
    pub fn new(extra: &[String]) -> Result<Self> {
        let patterns = BUILTIN_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .chain(extra.iter().cloned());
        let set = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()
            .map_err(|e| AlignError::validation(format!("invalid firewall pattern: {}", e)))?;
        Ok(Self { set })
    }

    /// Whether any sample matches any pattern.
    pub fn matches_any<S: AsRef<str>>(&self, samples: &[S]) -> bool {
        samples.iter().any(|s| self.set.is_match(s.as_ref()))
    }

    pub fn pattern_count(&self) -> usize {
        self.set.len()
    }
}
