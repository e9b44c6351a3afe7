//! In-memory representation of an extracted slide deck.

use serde::{Deserialize, Serialize};

/// Text content of a single slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    /// 1-indexed position in the deck.
    pub number: usize,
    /// Text of the title placeholder, `None` when absent or empty.
    pub title: Option<String>,
    /// Every other text-bearing element, in document order.
    pub body: Vec<String>,
}

impl Slide {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            title: None,
            body: Vec::new(),
        }
    }
}

/// Ordered textual content of one presentation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideDeck {
    /// File name of the source deck (no directory).
    pub file_name: String,
    pub slides: Vec<Slide>,
}

impl SlideDeck {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            slides: Vec::new(),
        }
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Titles of all slides that have one, in slide order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.slides.iter().filter_map(|s| s.title.as_deref())
    }
}
