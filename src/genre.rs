//! Closed genre inventory used by the classifier.
//!
//! Ordinals match the output rows of the fine-tuned classification head,
//! so the order of `Genre::ALL` must never change.

use serde::{Serialize, Serializer};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Genre {
    Action,
    Adventure,
    Animated,
    Comedy,
    Cult,
    Drama,
    Family,
    HistoricalDocumentary,
    Horror,
    International,
    Musical,
    Romance,
    ScienceFiction,
    ShortFilm,
    Thriller,
}

impl Genre {
    pub const ALL: [Genre; 15] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animated,
        Genre::Comedy,
        Genre::Cult,
        Genre::Drama,
        Genre::Family,
        Genre::HistoricalDocumentary,
        Genre::Horror,
        Genre::International,
        Genre::Musical,
        Genre::Romance,
        Genre::ScienceFiction,
        Genre::ShortFilm,
        Genre::Thriller,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Label text as the classifier was trained on it. This is also the
    /// prefix used when composing retrieval queries.
    pub fn as_str(self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animated => "Animated",
            Genre::Comedy => "Comedy",
            Genre::Cult => "Cult",
            Genre::Drama => "Drama",
            Genre::Family => "Family",
            Genre::HistoricalDocumentary => "Historical/Documentary",
            Genre::Horror => "Horror",
            Genre::International => "International",
            Genre::Musical => "Musical",
            Genre::Romance => "Romance",
            Genre::ScienceFiction => "Science Fiction",
            Genre::ShortFilm => "Short Film",
            Genre::Thriller => "Thriller",
        }
    }
}

impl Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Genre {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_follow_inventory_order() {
        for (idx, genre) in Genre::ALL.iter().enumerate() {
            assert_eq!(genre.ordinal(), idx);
            assert_eq!(Genre::from_ordinal(idx), Some(*genre));
        }
        assert_eq!(Genre::from_ordinal(Genre::COUNT), None);
    }

    #[test]
    fn labels_keep_original_spelling() {
        assert_eq!(Genre::HistoricalDocumentary.to_string(), "Historical/Documentary");
        assert_eq!(Genre::ScienceFiction.as_str(), "Science Fiction");
        assert_eq!(
            serde_json::to_string(&Genre::ShortFilm).unwrap(),
            "\"Short Film\""
        );
    }
}
