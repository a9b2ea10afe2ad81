use serde::{Deserialize, Serialize};
use std::fmt;

/// 業務内容の先頭2語から推定するカテゴリ
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceCategory(String);

impl ServiceCategory {
    pub fn infer(service_description: &str) -> Self {
        let words: Vec<&str> = service_description.split_whitespace().take(2).collect();
        if words.is_empty() {
            return Self("uncategorized".to_string());
        }
        Self(words.join(" ").to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_takes_first_two_words_lowercased() {
        let category = ServiceCategory::infer("HVAC Maintenance and quarterly filter swap");
        assert_eq!(category.as_str(), "hvac maintenance");
    }

    #[test]
    fn test_infer_single_word_description() {
        assert_eq!(ServiceCategory::infer("Landscaping").as_str(), "landscaping");
    }

    #[test]
    fn test_infer_blank_description_falls_back() {
        assert_eq!(ServiceCategory::infer("   ").as_str(), "uncategorized");
    }
}
