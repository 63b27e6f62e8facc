//! Proxy for "will static extraction succeed".
//!
//! The grammar here has to track the downstream markdown option parser:
//! priced image captions and priced checkbox list items, optionally under
//! `Category:` headings in either case.

use super::patterns::PatternSet;

/// At least this many priced options means the page is statically readable
pub const MIN_STATIC_OPTIONS: usize = 3;

/// Raw counts from one pass of the static-options grammar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticOptionScan {
    pub image_options: usize,
    pub checkbox_options: usize,
    pub has_categories: bool,
}

impl StaticOptionScan {
    pub fn scan(text: &str, patterns: &PatternSet) -> Self {
        Self {
            image_options: patterns.image_option.find_iter(text).count(),
            checkbox_options: patterns.checkbox_option.find_iter(text).count(),
            has_categories: patterns.category_heading.is_match(text),
        }
    }

    pub fn total_options(&self) -> usize {
        self.image_options + self.checkbox_options
    }

    /// Three priced options, or one priced option under a category heading
    pub fn options_found(&self) -> bool {
        let total = self.total_options();
        total >= MIN_STATIC_OPTIONS || (self.has_categories && total >= 1)
    }
}

/// Currency token or labelled price phrase anywhere in the text
pub fn has_price_element(text: &str, patterns: &PatternSet) -> bool {
    patterns.price_element.iter().any(|re| re.is_match(text))
}
