use std::collections::HashSet;
use tracing::debug;

use super::Control;

/// Labels of site chrome that never change a configured price
pub const IGNORE_KEYWORDS: &[&str] = &[
    // purchase
    "add to cart", "buy now", "checkout", "submit", "purchase", "add to bag", "add to wishlist",
    // navigation
    "next", "previous", "back", "home", "menu", "search", "hamburger",
    // account
    "login", "log in", "sign in", "sign up", "signup", "register", "my account",
    // social
    "share", "follow", "facebook", "twitter", "instagram", "linkedin", "youtube",
    // legal
    "privacy", "terms", "cookie", "gdpr", "accessibility", "skip to content",
    // misc
    "learn more", "read more", "view all", "contact",
];

/// Drops site-chrome controls and duplicates before a learning pass
#[derive(Debug, Clone)]
pub struct ControlFilter {
    ignore_keywords: Vec<String>,
}

impl Default for ControlFilter {
    fn default() -> Self {
        Self::new(IGNORE_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }
}

impl ControlFilter {
    pub fn new(ignore_keywords: Vec<String>) -> Self {
        Self {
            ignore_keywords: ignore_keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Keep order; first occurrence of a `group.label` key wins
    pub fn apply<H>(&self, controls: Vec<Control<H>>) -> Vec<Control<H>> {
        let before = controls.len();
        let mut seen = HashSet::new();

        let kept: Vec<_> = controls
            .into_iter()
            .filter(|control| {
                let label = control.label.trim().to_lowercase();
                !label.is_empty() && !self.is_ignored(&label) && seen.insert(control.key().to_lowercase())
            })
            .collect();

        debug!("Control filter kept {}/{} controls", kept.len(), before);
        kept
    }

    fn is_ignored(&self, label: &str) -> bool {
        self.ignore_keywords.iter().any(|keyword| label.contains(keyword.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ControlType;

    fn control(group: &str, label: &str, id: usize) -> Control<usize> {
        Control::new(group, label, ControlType::Checkbox, id)
    }

    #[test]
    fn test_filters_chrome_and_duplicates() {
        let controls = vec![
            control("Color", "Red", 0),
            control("Cart", "Add to Cart", 1),
            control("Color", "red", 2),
            control("Extras", "  ", 3),
            control("Extras", "Tow hitch", 4),
            control("Footer", "Privacy policy", 5),
        ];

        let kept = ControlFilter::default().apply(controls);
        let ids: Vec<usize> = kept.iter().map(|c| c.handle).collect();
        assert_eq!(ids, vec![0, 4]);
    }

    #[test]
    fn test_custom_keywords() {
        let filter = ControlFilter::new(vec!["Gift".to_string()]);
        let kept = filter.apply(vec![control("Wrap", "Gift wrap", 0), control("Wrap", "Add to cart", 1)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].handle, 1);
    }
}
