//! Keyword data decoding
//!
//! Host applications have stored keyword data in several shapes over time:
//! a `{word: weight}` object, a list of `{word, weight}` records, or a plain
//! list of words. All of them decode to one canonical `Vec<Keyword>`.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordError {
    #[error("Unsupported keyword data: {0}")]
    UnsupportedShape(String),
}

/// A keyword with its extraction weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub weight: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKeywords {
    Weighted(OrderedWeights),
    Records(Vec<KeywordRecord>),
    Words(Vec<String>),
}

/// `{word: weight}` pairs in the order they were stored
struct OrderedWeights(Vec<(String, f32)>);

impl<'de> Deserialize<'de> for OrderedWeights {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WeightsVisitor;

        impl<'de> Visitor<'de> for WeightsVisitor {
            type Value = OrderedWeights;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of keyword to weight")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((word, weight)) = map.next_entry::<String, f32>()? {
                    pairs.push((word, weight));
                }
                Ok(OrderedWeights(pairs))
            }
        }

        deserializer.deserialize_map(WeightsVisitor)
    }
}

#[derive(Deserialize)]
struct KeywordRecord {
    word: String,
    #[serde(default = "default_weight")]
    weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl From<RawKeywords> for Vec<Keyword> {
    fn from(raw: RawKeywords) -> Self {
        let keywords: Vec<Keyword> = match raw {
            RawKeywords::Weighted(OrderedWeights(pairs)) => pairs
                .into_iter()
                .map(|(word, weight)| Keyword { word, weight })
                .collect(),
            RawKeywords::Records(records) => records
                .into_iter()
                .map(|r| Keyword {
                    word: r.word,
                    weight: r.weight,
                })
                .collect(),
            RawKeywords::Words(words) => words
                .into_iter()
                .map(|word| Keyword {
                    word,
                    weight: default_weight(),
                })
                .collect(),
        };

        keywords
            .into_iter()
            .map(|k| Keyword {
                word: k.word.trim().to_string(),
                weight: k.weight,
            })
            .filter(|k| !k.word.is_empty())
            .collect()
    }
}

/// Decode stored keyword data into its canonical form
///
/// Blank input decodes to no keywords. Data written with Python literal
/// quoting (`[{'word': ..}]`) is retried once with its single-quoted
/// strings rewritten as JSON strings before it is rejected.
pub fn decode_keywords(raw: &str) -> Result<Vec<Keyword>, KeywordError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<RawKeywords>(raw) {
        Ok(parsed) => Ok(parsed.into()),
        Err(first) if raw.contains('\'') => {
            serde_json::from_str::<RawKeywords>(&python_quotes_to_json(raw))
                .map(Into::into)
                .map_err(|_| KeywordError::UnsupportedShape(first.to_string()))
        }
        Err(e) => Err(KeywordError::UnsupportedShape(e.to_string())),
    }
}

/// Rewrite `'...'` string literals as `"..."`
///
/// Apostrophes inside double-quoted strings are left alone and double
/// quotes inside single-quoted strings are escaped.
fn python_quotes_to_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut delimiter: Option<char> = None;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match (delimiter, c) {
            (None, '\'') | (None, '"') => {
                delimiter = Some(c);
                out.push('"');
            }
            (None, _) => out.push(c),
            (Some(_), '\\') => match chars.next() {
                Some('\'') => out.push('\''),
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => out.push('\\'),
            },
            (Some(open), _) if c == open => {
                delimiter = None;
                out.push('"');
            }
            (Some('\''), '"') => out.push_str("\\\""),
            (Some(_), _) => out.push(c),
        }
    }

    out
}

/// Decode keyword data for one item, logging and dropping anything malformed
pub fn keywords_or_empty(item_id: i64, raw: Option<&str>) -> Vec<Keyword> {
    match raw.map(decode_keywords) {
        None => Vec::new(),
        Some(Ok(keywords)) => keywords,
        Some(Err(e)) => {
            tracing::warn!("Ignoring keyword data for item {}: {}", item_id, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(keywords: &[Keyword]) -> Vec<&str> {
        keywords.iter().map(|k| k.word.as_str()).collect()
    }

    #[test]
    fn test_record_list() {
        let keywords =
            decode_keywords(r#"[{"word": "파이썬", "weight": 10.0}, {"word": "데이터", "weight": 4}]"#)
                .unwrap();
        assert_eq!(words(&keywords), vec!["파이썬", "데이터"]);
        assert_eq!(keywords[1].weight, 4.0);
    }

    #[test]
    fn test_weighted_map_keeps_stored_order() {
        let keywords = decode_keywords(r#"{"우정": 3.5, "모험": 7, "가족": 1}"#).unwrap();
        assert_eq!(words(&keywords), vec!["우정", "모험", "가족"]);
        assert_eq!(keywords[1].weight, 7.0);
    }

    #[test]
    fn test_plain_word_list() {
        let keywords = decode_keywords(r#"["space", "  ", "robots"]"#).unwrap();
        assert_eq!(words(&keywords), vec!["space", "robots"]);
        assert!(keywords.iter().all(|k| k.weight == 1.0));
    }

    #[test]
    fn test_python_literal_quoting() {
        let keywords = decode_keywords("[{'word': '역사', 'weight': 2.0}]").unwrap();
        assert_eq!(words(&keywords), vec!["역사"]);
    }

    #[test]
    fn test_mixed_quote_literal() {
        let keywords = decode_keywords(r#"[{'word': "don't", 'weight': 2}, {'word': 'say "hi"'}]"#)
            .unwrap();
        assert_eq!(words(&keywords), vec!["don't", "say \"hi\""]);
        assert_eq!(keywords[1].weight, 1.0);
    }

    #[test]
    fn test_python_weighted_map() {
        let keywords = decode_keywords("{'우정': 3.5, '모험': 7}").unwrap();
        assert_eq!(words(&keywords), vec!["우정", "모험"]);
    }

    #[test]
    fn test_blank_is_empty() {
        assert!(decode_keywords("").unwrap().is_empty());
        assert!(decode_keywords("   ").unwrap().is_empty());
        assert!(decode_keywords("[]").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_shapes_rejected() {
        assert!(decode_keywords("42").is_err());
        assert!(decode_keywords(r#"{"word": "not a weight"}"#).is_err());
        assert!(decode_keywords("[{'word': ").is_err());
        assert!(decode_keywords("just some words").is_err());
    }

    #[test]
    fn test_keywords_or_empty_swallows_errors() {
        assert!(keywords_or_empty(1, Some("{{{")).is_empty());
        assert!(keywords_or_empty(1, None).is_empty());
        assert_eq!(keywords_or_empty(1, Some(r#"["a"]"#)).len(), 1);
    }

    #[test]
    fn test_error_converts_to_crate_error() {
        let err: crate::error::CheerError = decode_keywords("42").unwrap_err().into();
        assert!(err.to_string().starts_with("Keyword error"));
    }
}
