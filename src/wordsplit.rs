//! Unicode word-break tokenizer. The source splits on a fixed ASCII
//! whitespace/punctuation table; this crate instead tokenizes on Unicode
//! word boundaries (UAX #29) via `unicode-segmentation`, matching how the
//! corpus's closest sibling crates tokenize real chat/forum text.

use unicode_segmentation::UnicodeSegmentation;

/// Splits `text` into lowercased word tokens, in order, dropping boundary
/// runs (whitespace, punctuation) that `unicode_word_indices` doesn't
/// consider a word.
pub fn split_words(text: &str) -> Vec<String> {
    text.unicode_word_indices().map(|(_, w)| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace_and_punctuation() {
        assert_eq!(split_words("Hello, world!"), vec!["hello", "world"]);
    }

    #[test]
    fn lowercases_tokens() {
        assert_eq!(split_words("FOO Bar"), vec!["foo", "bar"]);
    }

    #[test]
    fn handles_unicode_word_characters() {
        assert_eq!(split_words("café naïve"), vec!["café", "naïve"]);
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        assert!(split_words("   ...   ").is_empty());
    }
}
