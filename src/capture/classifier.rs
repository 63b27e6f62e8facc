use url::Url;

/// Path fragments that mark a response as likely carrying price data
pub const PRICING_PATH_TOKENS: &[&str] = &[
    "/price",
    "/total",
    "/calculate",
    "/cart",
    "/quote",
    "/estimate",
    "graphql",
    "/api",
];

/// Decides which observed responses are worth parsing for prices
#[derive(Debug, Clone)]
pub struct ExchangeClassifier {
    path_tokens: Vec<String>,
}

impl Default for ExchangeClassifier {
    fn default() -> Self {
        Self::new(PRICING_PATH_TOKENS.iter().map(|t| t.to_string()).collect())
    }
}

impl ExchangeClassifier {
    pub fn new(path_tokens: Vec<String>) -> Self {
        Self {
            path_tokens: path_tokens.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn is_pricing(&self, url: &str, content_type: &str) -> bool {
        is_structured(content_type) || self.path_matches(url)
    }

    fn path_matches(&self, url: &str) -> bool {
        // host names such as api.example.com must not count
        let target = match Url::parse(url) {
            Ok(parsed) => match parsed.query() {
                Some(query) => format!("{}?{}", parsed.path(), query),
                None => parsed.path().to_string(),
            },
            Err(_) => url.to_string(),
        }
        .to_lowercase();

        self.path_tokens.iter().any(|token| target.contains(token.as_str()))
    }
}

/// JSON and its `+json` variants
fn is_structured(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}
