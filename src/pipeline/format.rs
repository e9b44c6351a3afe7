//! Prompt formatting: instruction prompt + plain-text rendering of the deck.

use crate::deck::SlideDeck;
use crate::prompts::DECK_SEPARATOR;
use std::fmt::Write;

/// Render a deck as the plain-text block the model reads.
///
/// ```text
/// Presentation: wi.pptx
/// Total Slides: 2
///
/// --- Slide 1 ---
/// Title: Cassette Assembly Procedure
/// Content:
///   • Assemble the filter cassette
/// ```
pub fn format_deck(deck: &SlideDeck) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Presentation: {}", deck.file_name);
    let _ = writeln!(out, "Total Slides: {}", deck.slide_count());
    out.push('\n');

    for slide in &deck.slides {
        let _ = writeln!(out, "--- Slide {} ---", slide.number);
        if let Some(title) = slide.title.as_deref().filter(|t| !t.is_empty()) {
            let _ = writeln!(out, "Title: {title}");
        }
        if !slide.body.is_empty() {
            out.push_str("Content:\n");
            for line in &slide.body {
                let _ = writeln!(out, "  • {line}");
            }
        }
        out.push('\n');
    }

    out
}

/// Combine the instruction prompt with the rendered deck.
pub fn build_prompt(deck: &SlideDeck, instruction: &str) -> String {
    format!("{instruction}{DECK_SEPARATOR}{}", format_deck(deck))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Slide;

    fn deck() -> SlideDeck {
        SlideDeck {
            file_name: "wi.pptx".into(),
            slides: vec![
                Slide {
                    number: 1,
                    title: Some("Cassette Assembly Procedure".into()),
                    body: vec!["Assemble the filter cassette".into()],
                },
                Slide {
                    number: 2,
                    title: None,
                    body: vec![],
                },
            ],
        }
    }

    #[test]
    fn formats_slides_with_labels_and_bullets() {
        let text = format_deck(&deck());
        assert_eq!(
            text,
            "Presentation: wi.pptx\nTotal Slides: 2\n\n\
             --- Slide 1 ---\nTitle: Cassette Assembly Procedure\nContent:\n  • Assemble the filter cassette\n\n\
             --- Slide 2 ---\n\n"
        );
    }

    #[test]
    fn prompt_precedes_separator_and_deck() {
        let prompt = build_prompt(&deck(), "Return JSON.");
        assert!(prompt.starts_with("Return JSON.\n\nPowerPoint Content:\nPresentation: wi.pptx"));
    }

    #[test]
    fn deterministic() {
        assert_eq!(build_prompt(&deck(), "p"), build_prompt(&deck(), "p"));
    }
}
