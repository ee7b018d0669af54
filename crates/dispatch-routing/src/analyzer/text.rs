//! Tokenization and normalization of task descriptions.
//!
//! Tokens are lowercase runs of alphanumerics plus the joiners `- / . _ + #`,
//! so `ci/cd`, `full-stack` and `app.tsx` survive as single tokens. Joiners
//! are trimmed from token ends. No stemming is applied.

use dispatch_core::TaskSignature;
use xxhash_rust::xxh3::xxh3_64;

const JOINERS: [char; 6] = ['-', '/', '.', '_', '+', '#'];
const TRIMMED: [char; 4] = ['-', '/', '.', '_'];
/// Never valid UTF-8, so it cannot occur inside a part.
const PART_TERMINATOR: u8 = 0xff;

/// A normalized task description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskText {
    original: String,
    lowered: String,
    tokens: Vec<String>,
    normalized: String,
    padded: String,
    signature: TaskSignature,
    truncated: bool,
}

impl TaskText {
    /// Normalizes a description, truncating it to `max_chars` characters.
    pub fn new(description: &str, max_chars: usize) -> Self {
        let (original, truncated) = match description.char_indices().nth(max_chars) {
            Some((byte_index, _)) => (&description[..byte_index], true),
            None => (description, false),
        };
        let lowered = original.to_lowercase();
        let tokens = tokenize(&lowered);
        let normalized = tokens.join(" ");
        let padded = format!(" {normalized} ");
        let signature = TaskSignature(hash_parts(&[normalized.as_str()]));

        Self {
            original: original.to_owned(),
            lowered,
            tokens,
            normalized,
            padded,
            signature,
            truncated,
        }
    }

    /// Description as routed, after truncation.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Lowercased description with punctuation intact.
    pub fn lowered(&self) -> &str {
        &self.lowered
    }

    /// Tokens in order of appearance.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Tokens joined by single spaces.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Hash of the normalized text.
    pub fn signature(&self) -> TaskSignature {
        self.signature
    }

    /// Whether the description was cut to the length limit.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the description has no tokens at all.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Whether a normalized phrase occurs on token boundaries.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        !phrase.is_empty() && self.padded.contains(&format!(" {phrase} "))
    }

    /// Cache key for this text under a tier prefix.
    pub fn cache_key(&self, prefix: &str) -> u64 {
        hash_parts(&[prefix, self.normalized.as_str()])
    }
}

/// Splits lowercase text into tokens.
pub fn tokenize(lowered: &str) -> Vec<String> {
    lowered
        .split(|character: char| !(character.is_alphanumeric() || JOINERS.contains(&character)))
        .map(|raw| raw.trim_matches(|character: char| TRIMMED.contains(&character)))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Normalizes a rule phrase the same way descriptions are normalized.
pub fn normalize_phrase(phrase: &str) -> String {
    tokenize(&phrase.to_lowercase()).join(" ")
}

/// XXH3-64 (seed 0) over the parts, each followed by a `0xff` byte.
///
/// Signatures are persisted with the weight table, so the digest must not
/// change between builds or toolchains.
pub fn hash_parts(parts: &[&str]) -> u64 {
    let mut bytes = Vec::with_capacity(parts.iter().map(|part| part.len() + 1).sum());
    for part in parts {
        bytes.extend_from_slice(part.as_bytes());
        bytes.push(PART_TERMINATOR);
    }
    xxh3_64(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_joined_terms() {
        let tokens = tokenize("set up ci/cd for the full-stack app (see app.tsx), now.");
        assert_eq!(
            tokens,
            vec!["set", "up", "ci/cd", "for", "the", "full-stack", "app", "see", "app.tsx", "now"]
        );
    }

    #[test]
    fn test_normalization_is_stable_under_spacing_and_case() {
        let first = TaskText::new("Review  this CODE\tfor security!", 2000);
        let second = TaskText::new("review this code for security", 2000);
        assert_eq!(first.normalized(), second.normalized());
        assert_eq!(first.signature(), second.signature());
        assert_eq!(first.cache_key("complexity"), second.cache_key("complexity"));
        assert_ne!(first.cache_key("complexity"), first.cache_key("domain"));
    }

    #[test]
    fn test_phrase_matching_respects_boundaries() {
        let text = TaskText::new("Run a security audit today", 2000);
        assert!(text.contains_phrase("security audit"));
        assert!(!text.contains_phrase("curity audit"));
        assert!(!text.contains_phrase(""));
    }

    #[test]
    fn test_truncation_on_char_boundary() {
        let text = TaskText::new("héllo wörld", 4);
        assert_eq!(text.original(), "héll");
        assert!(text.was_truncated());
        assert!(!TaskText::new("short", 10).was_truncated());
    }

    #[test]
    fn test_signature_uses_fixed_xxh3_digest() {
        assert_eq!(hash_parts(&[]), 0x2D06_8005_38D3_94C2);
        assert_eq!(hash_parts(&["review code"]), xxh3_64(b"review code\xff"));
        assert_eq!(
            TaskText::new("Review  CODE", 100).signature(),
            TaskSignature(xxh3_64(b"review code\xff"))
        );
        assert_ne!(hash_parts(&["ab", "c"]), hash_parts(&["a", "bc"]));
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(TaskText::new("", 100).is_empty());
        assert!(TaskText::new("  ?!... ---  ", 100).is_empty());
    }
}
