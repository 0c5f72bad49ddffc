//! This module defines constants shared by the mutation engine.
//! These are the identifier naming scheme used by normalized corpus testcases,
//! the placeholder used inside operation fragments, and the probabilities that
//! steer candidate selection in the mutators.

/// Prefix of normalized variable names (`var_1_`, `var_2_`, ...).
pub const VARIABLE_PREFIX: &str = "var_";

/// Prefix of normalized function names (`func_1_`, ...).
pub const FUNCTION_PREFIX: &str = "func_";

/// Prefix of normalized class names (`cl_1_`, ...).
pub const CLASS_PREFIX: &str = "cl_";

/// The token an operation fragment uses for the variable it operates on.
/// It is substituted with a real variable name after the fragment was merged.
pub const PLACEHOLDER_TOKEN: &str = "var_TARGET_";

/// Keywords that open a block. Lines starting with one of these are almost never
/// safe to remove, duplicate or wrap on their own.
pub const BLOCK_KEYWORDS: &[&str] = &["function", "class", "if", "for", "while", "switch"];

/// Keywords that make a line structurally significant. Wrap mutations skip
/// lines containing any of them.
pub const STRUCTURAL_KEYWORDS: &[&str] = &[
    "function", "class", "if", "else", "for", "while", "do", "switch", "case", "default", "try",
    "catch", "finally", "return", "break", "continue", "yield", "await", "let", "const",
];

/// Declaration keywords.
pub const DECLARATION_KEYWORDS: &[&str] = &["var", "let", "const"];

/// Probability that a line containing a curly bracket is still considered
/// for removal or duplication.
pub const ALLOW_BRACKET_LINES_PROBABILITY: f64 = 0.05;

/// Probability that lines starting with a block keyword are still considered.
pub const ALLOW_BLOCK_KEYWORD_LINES_PROBABILITY: f64 = 0.05;

/// Probability that declaration lines are still considered for removal.
pub const ALLOW_DECLARATION_LINES_PROBABILITY: f64 = 0.3;

/// Buckets with at most this many operations are "rare".
pub const SMALL_BUCKET_LIMIT: usize = 10;

/// Buckets with at most this many operations are "medium sized".
pub const MEDIUM_BUCKET_LIMIT: usize = 100;
