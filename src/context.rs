//! Title → synopsis join for follow-up questions.

use std::collections::HashMap;

use crate::catalog::ContextRecord;

/// Exact-title lookup over the context table.
///
/// When a title appears more than once, the first row in table order is the
/// one returned.
pub struct ContextResolver {
    records: Vec<ContextRecord>,
    first_row: HashMap<String, usize>,
}

impl ContextResolver {
    pub fn new(records: Vec<ContextRecord>) -> Self {
        let mut first_row = HashMap::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            first_row.entry(record.title.clone()).or_insert(row);
        }
        Self { records, first_row }
    }

    /// Synopsis for `title`, or `None` when no row carries that exact title.
    /// A present-but-empty synopsis is `Some("")`.
    pub fn resolve(&self, title: &str) -> Option<&str> {
        self.first_row
            .get(title)
            .map(|&row| self.records[row].context.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, context: &str) -> ContextRecord {
        ContextRecord {
            title: title.to_string(),
            context: context.to_string(),
        }
    }

    #[test]
    fn absent_title_is_not_found() {
        let resolver = ContextResolver::new(vec![record("Heat", "A heist.")]);
        assert_eq!(resolver.resolve("Ronin"), None);
    }

    #[test]
    fn first_duplicate_row_wins() {
        let resolver = ContextResolver::new(vec![
            record("Alien", "first synopsis"),
            record("Heat", "A heist."),
            record("Alien", "second synopsis"),
        ]);
        assert_eq!(resolver.resolve("Alien"), Some("first synopsis"));
        assert_eq!(resolver.len(), 3);
    }

    #[test]
    fn match_is_exact() {
        let resolver = ContextResolver::new(vec![record("The Matrix", "Neo wakes up.")]);
        assert_eq!(resolver.resolve("the matrix"), None);
        assert_eq!(resolver.resolve("The Matrix "), None);
        assert_eq!(resolver.resolve("The Matrix"), Some("Neo wakes up."));
    }

    #[test]
    fn empty_context_differs_from_missing() {
        let resolver = ContextResolver::new(vec![record("Ronin", "")]);
        assert_eq!(resolver.resolve("Ronin"), Some(""));
    }
}
