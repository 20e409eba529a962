//! Catalog tables: the ordered title mapping and the title → synopsis table.

use std::path::Path;
use std::time::Instant;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextRecord {
    pub title: String,
    pub context: String,
}

#[derive(Deserialize)]
struct TitleRow {
    title: String,
}

/// Ordered list of catalog titles.
#[derive(Debug, Default)]
pub struct Catalog {
    titles: Vec<String>,
}

impl Catalog {
    pub fn new(titles: Vec<String>) -> Self {
        Self { titles }
    }

    /// Read the title mapping CSV. Rows are kept in file order.
    pub fn load(path: &Path) -> Result<Self, csv::Error> {
        let now = Instant::now();
        let mut reader = csv::Reader::from_path(path)?;

        let titles = reader
            .deserialize::<TitleRow>()
            .map(|row| row.map(|r| r.title))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "took {}ms to read {} titles",
            now.elapsed().as_micros() as f64 / 1000.0,
            titles.len()
        );

        Ok(Self { titles })
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn title(&self, id: usize) -> Option<&str> {
        self.titles.get(id).map(String::as_str)
    }
}

/// Read the context CSV (`title`, `context` columns) in file order.
pub fn load_contexts(path: &Path) -> Result<Vec<ContextRecord>, csv::Error> {
    let now = Instant::now();
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize::<ContextRecord>()
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "took {}ms to read {} context rows",
        now.elapsed().as_micros() as f64 / 1000.0,
        records.len()
    );

    Ok(records)
}
