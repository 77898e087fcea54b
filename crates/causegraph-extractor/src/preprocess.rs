//! Entity normalization
//!
//! Converts a raw cause or effect span into the canonical key used for
//! clustering: punctuation stripped, word tokens, lowercased, stop-words
//! removed, optionally lemmatized. Normalization is idempotent.

use std::collections::HashSet;

use causegraph_core::config::PreprocessingConfig;
use once_cell::sync::Lazy;
use regex::Regex;

/// Word tokens after punctuation removal
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word regex"));

/// English stop-words
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
        "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
        "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
        "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
        "that", "that'll", "these", "those", "am", "is", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the",
        "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
        "with", "about", "against", "between", "into", "through", "during", "before", "after",
        "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
        "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
        "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
        "will", "just", "don", "don't", "should", "should've", "now", "d", "ll", "m", "o", "re",
        "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn", "didn't", "doesn",
        "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn", "isn't", "ma",
        "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
        "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
        "wouldn't",
    ]
    .into_iter()
    .collect()
});

/// Normalization switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Lowercase every token
    pub lowercase: bool,
    /// Reduce plural nouns to their singular form
    pub lemmatize: bool,
    /// Drop English stop-words
    pub remove_stop_words: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            lemmatize: false,
            remove_stop_words: true,
        }
    }
}

impl From<&PreprocessingConfig> for PreprocessOptions {
    fn from(config: &PreprocessingConfig) -> Self {
        Self {
            lowercase: config.lowercase,
            lemmatize: config.lemmatize,
            remove_stop_words: config.remove_stop_words,
        }
    }
}

/// Normalizes entity strings into clustering keys
#[derive(Debug, Clone, Default)]
pub struct EntityPreprocessor {
    options: PreprocessOptions,
}

impl EntityPreprocessor {
    /// Create a preprocessor with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preprocessor with custom options
    pub fn with_options(options: PreprocessOptions) -> Self {
        Self { options }
    }

    /// Create a preprocessor from the `[preprocessing]` config section
    pub fn from_config(config: &PreprocessingConfig) -> Self {
        Self::with_options(config.into())
    }

    pub fn options(&self) -> PreprocessOptions {
        self.options
    }

    /// Normalize an entity; returns "" when no token survives
    pub fn normalize(&self, entity: &str) -> String {
        let cleaned: String = entity
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect();

        let mut tokens = Vec::new();
        for word in WORD.find_iter(&cleaned) {
            let raw = word.as_str();
            let mut token = if self.options.lowercase {
                raw.to_lowercase()
            } else {
                raw.to_string()
            };
            if self.options.lemmatize {
                token = lemmatize(&token);
            }

            // Checked on the surface and the lemma so a second pass cannot
            // drop a token the first pass kept.
            if self.options.remove_stop_words
                && (is_stop_word(raw) || is_stop_word(&token))
            {
                continue;
            }
            tokens.push(token);
        }

        tokens.join(" ")
    }

    /// True when the entity normalizes to nothing
    pub fn is_unusable(&self, entity: &str) -> bool {
        self.normalize(entity).is_empty()
    }
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token.to_lowercase().as_str())
}

/// Suffix-based noun lemmatizer.
///
/// Every rule produces a word no rule matches again, so the function is
/// idempotent.
fn lemmatize(token: &str) -> String {
    let len = token.chars().count();

    if len > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if token.ends_with("sses") {
        return token[..token.len() - 2].to_string();
    }
    if len > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

// ============================================================================
// Tests
// ============================================================================
