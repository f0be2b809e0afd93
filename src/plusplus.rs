//! Scans a zgram body for `word++` / `word--` voting syntax and reduces it
//! to one net delta per distinct key. The source treats this scanner as an
//! external dependency (spec.md §4.5); this is this crate's own contract,
//! built to match the worked example in spec.md §8 scenario 5: the body
//! `"coffee++ tea++ coffee++"` nets `coffee: +2, tea: +1`.

use rustc_hash::FxHashMap;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Net per-key delta across every `word++`/`word--` occurrence in `body`,
/// keyed by the lowercased word, sorted by key for deterministic output.
pub fn scan(body: &str) -> Vec<(String, i64)> {
    let chars: Vec<char> = body.chars().collect();
    let mut deltas: FxHashMap<String, i64> = FxHashMap::default();
    let mut i = 0;
    while i < chars.len() {
        if !is_word_char(chars[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && is_word_char(chars[i]) {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect::<String>().to_lowercase();

        if i + 1 < chars.len() && chars[i] == '+' && chars[i + 1] == '+' && !starts_with_sign(&chars, i + 2, '+') {
            *deltas.entry(word).or_insert(0) += 1;
            i += 2;
        } else if i + 1 < chars.len()
            && chars[i] == '-'
            && chars[i + 1] == '-'
            && !starts_with_sign(&chars, i + 2, '-')
        {
            *deltas.entry(word).or_insert(0) -= 1;
            i += 2;
        }
    }
    // Unlike a plain sum, a key that nets to exactly zero is kept: the
    // digestor writes it as a single "balanced" entry to both the
    // plus-plus and minus-minus streams rather than dropping it, so that
    // dependency tracking on that key still sees an event for this zgram.
    let mut out: Vec<(String, i64)> = deltas.into_iter().collect();
    out.sort();
    out
}

fn starts_with_sign(chars: &[char], pos: usize, sign: char) -> bool {
    pos < chars.len() && chars[pos] == sign
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nets_repeated_plus_pluses() {
        let deltas = scan("coffee++ tea++ coffee++");
        assert_eq!(deltas, vec![("coffee".to_string(), 2), ("tea".to_string(), 1)]);
    }

    #[test]
    fn plus_and_minus_cancel() {
        let deltas = scan("widget++ widget-- widget++");
        assert_eq!(deltas, vec![("widget".to_string(), 1)]);
    }

    #[test]
    fn exact_cancellation_nets_to_zero_but_keeps_the_key() {
        let deltas = scan("widget++ widget--");
        assert_eq!(deltas, vec![("widget".to_string(), 0)]);
    }

    #[test]
    fn triple_plus_is_not_a_vote() {
        assert!(scan("weirdlang+++").is_empty());
    }

    #[test]
    fn ignores_plain_text() {
        assert!(scan("no voting syntax here").is_empty());
    }
}
