//! Task text analysis: tokenization, compiled rule tables and the complexity classifier.

mod classifier;
mod rulebook;
mod text;

pub use classifier::{
    COMPLEXITY_PATTERN_PREFIX, ComplexityFactors, HierarchicalClassifier, pattern_id,
};
pub use rulebook::{CompiledDomain, Rulebook};
pub use text::{TaskText, hash_parts, normalize_phrase, tokenize};
