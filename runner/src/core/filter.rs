//! Name-prefix filters for test cases and sections.
//!
//! A filter matches a name when either string is a prefix of the other, after
//! lowercasing both. This lets `"parser"` select every case under `parser`
//! and lets `"parser.tokens.numbers"` still enter the enclosing `parser` and
//! `parser.tokens` blocks on the way down.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    patterns: Vec<String>,
}

impl NameFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a comma-separated list of patterns. Blank entries are dropped.
    pub fn add(&mut self, csv: &str) {
        for pattern in csv.split(',') {
            let pattern = pattern.trim();
            if !pattern.is_empty() {
                self.patterns.push(pattern.to_lowercase());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// An empty filter matches everything.
    pub fn matches(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| check_prefix(pattern, &name))
    }
}

impl<S: AsRef<str>> FromIterator<S> for NameFilter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut filter = NameFilter::new();
        for csv in iter {
            filter.add(csv.as_ref());
        }
        filter
    }
}

fn check_prefix(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
