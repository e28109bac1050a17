//! Free-text tokenization and relevance scoring used by `text_search`.
//!
//! Tokenization is simple and deterministic:
//! - Split on non-alphanumeric characters (including `_` and `.`).
//! - Lowercase everything, so `JavaScript` and `javascript` are one token.
//! - Ignore single-character tokens and common stopwords.

use std::collections::HashMap;

const MAX_TOKEN_LEN: usize = 64;
const MIN_TOKEN_LEN: usize = 2;
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "in", "is", "of", "on", "or", "the", "to", "with",
];

pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() {
            if current.chars().count() < MAX_TOKEN_LEN {
                current.extend(c.to_lowercase());
            }
            continue;
        }

        if !current.is_empty() {
            push_token_if_interesting(&mut tokens, &mut current);
        }
    }

    if !current.is_empty() {
        push_token_if_interesting(&mut tokens, &mut current);
    }

    tokens
}

fn push_token_if_interesting(tokens: &mut Vec<String>, current: &mut String) {
    if current.chars().count() >= MIN_TOKEN_LEN && !STOPWORDS.contains(&current.as_str()) {
        tokens.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Distinct query terms in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms = tokenize(query);
    let mut seen = std::collections::HashSet::new();
    terms.retain(|t| seen.insert(t.clone()));
    terms
}

/// Relevance of `text` for `terms`: each matching term contributes
/// `1 + ln(tf)`. Returns 0.0 when no term occurs.
pub fn score(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let mut tf: HashMap<String, u32> = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0) += 1;
    }
    terms
        .iter()
        .filter_map(|t| tf.get(t))
        .map(|&n| 1.0 + f64::from(n).ln())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_drops_noise() {
        assert_eq!(
            tokenize("PaymentService is a core_service of the platform"),
            vec!["paymentservice", "core", "service", "platform"]
        );
    }

    #[test]
    fn test_mixed_case_query_matches_lowercased_body() {
        let terms = query_terms("JavaScript");
        assert_eq!(terms, vec!["javascript"]);
        assert!(score(&terms, "javascript language") > 0.0);
        assert_eq!(
            score(&terms, "javascript language"),
            score(&query_terms("javascript"), "javascript language")
        );
    }

    #[test]
    fn test_score_prefers_more_matches() {
        let terms = query_terms("coffee paris");
        let both = score(&terms, "alice person likes coffee lives in paris");
        let one = score(&terms, "bob person likes coffee");
        let none = score(&terms, "carol person");
        assert!(both > one);
        assert!(one > none);
        assert_eq!(none, 0.0);
    }

    #[test]
    fn test_stopword_query_has_no_terms() {
        assert!(query_terms("the of a").is_empty());
    }
}
