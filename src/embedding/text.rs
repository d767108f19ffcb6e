/// Canonical text fed to the embedding model for an item
use crate::models::Item;

/// Description, category names and keyword words, joined as sentences
///
/// Empty parts are left out, so an item with no text at all yields `""`.
/// The output depends only on the item's content, which keeps embedding
/// idempotent for unchanged items.
pub fn canonical_text(item: &Item) -> String {
    let description = item.description.as_deref().unwrap_or("").trim().to_string();
    let categories = item.categories.join(" ");
    let keywords = item
        .keywords
        .iter()
        .map(|k| k.word.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    [description, categories, keywords]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Keyword;

    fn item(description: Option<&str>, categories: &[&str], keywords: &[&str]) -> Item {
        Item {
            id: 1,
            title: "제목".to_string(),
            description: description.map(String::from),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            keywords: keywords
                .iter()
                .map(|w| Keyword {
                    word: w.to_string(),
                    weight: 1.0,
                })
                .collect(),
            embedding: None,
        }
    }

    #[test]
    fn test_all_parts() {
        let text = canonical_text(&item(
            Some("A boy and his robot. "),
            &["SF", "청소년"],
            &["robot", "friendship"],
        ));
        assert_eq!(text, "A boy and his robot.. SF 청소년. robot friendship");
    }

    #[test]
    fn test_missing_parts_are_skipped() {
        assert_eq!(canonical_text(&item(None, &["시"], &[])), "시");
        assert_eq!(canonical_text(&item(Some("only text"), &[], &["kw"])), "only text. kw");
    }

    #[test]
    fn test_empty_item() {
        assert_eq!(canonical_text(&item(None, &[], &[])), "");
        assert_eq!(canonical_text(&item(Some("   "), &[], &[])), "");
    }
}
