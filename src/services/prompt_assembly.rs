//! Prompt assembly: builds a Segment's `full_prompt` (§4.6 step 2, §3A).
//!
//! Longest-name-first character substitution with quotation-aware skipping,
//! per the design note in §9 ("no general NLP").

use crate::domain::models::storyboard::{CharacterRef, Segment};

/// Matched open/close quotation characters. ASCII quotes use the same glyph
/// for open and close; CJK quotes are distinct pairs.
const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}'), ('\u{2018}', '\u{2019}'), ('\u{300c}', '\u{300d}'), ('\u{300e}', '\u{300f}')];

/// Byte ranges of `text` that fall inside a recognized quotation span.
fn quote_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open: Option<(char, usize)> = None;

    for (idx, ch) in text.char_indices() {
        if let Some((close_char, start)) = open {
            if ch == close_char {
                ranges.push((start, idx + ch.len_utf8()));
                open = None;
            }
            continue;
        }
        if let Some(&(_, close)) = QUOTE_PAIRS.iter().find(|(o, _)| *o == ch) {
            open = Some((close, idx));
        }
    }
    ranges
}

fn overlaps(start: usize, end: usize, ranges: &[(usize, usize)]) -> bool {
    ranges.iter().any(|(a, b)| start < *b && end > *a)
}

/// Longest-name-first, quotation-aware substitution of character names into
/// their bracketed `@id` form. Names with no `id` are left untouched.
fn substitute_characters(text: &str, characters: &[CharacterRef]) -> String {
    let quoted = quote_ranges(text);

    let mut ordered: Vec<&CharacterRef> = characters.iter().filter(|c| c.id.is_some() && !c.name.is_empty()).collect();
    ordered.sort_by_key(|c| std::cmp::Reverse(c.name.chars().count()));

    let mut consumed: Vec<(usize, usize)> = Vec::new();
    let mut replacements: Vec<(usize, usize, String)> = Vec::new();

    for character in ordered {
        let name = character.name.as_str();
        let mut search_from = 0;
        while let Some(rel) = text[search_from..].find(name) {
            let start = search_from + rel;
            let end = start + name.len();
            search_from = end;

            if overlaps(start, end, &quoted) || overlaps(start, end, &consumed) {
                continue;
            }
            consumed.push((start, end));
            replacements.push((start, end, format!("[@{}]", character.id.as_ref().expect("filtered above"))));
        }
    }

    replacements.sort_by_key(|(start, _, _)| *start);

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, end, rep) in replacements {
        if start < last {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(&rep);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the `full_prompt` stored on a Task (§4.6 step 2).
///
/// Order: character-name substitution, scene/props annotation, director-note
/// annotation, whitespace collapse.
#[must_use]
pub fn build_full_prompt(segment: &Segment) -> String {
    let mut text = segment.prompt_text.clone();

    if let Some(asset) = &segment.asset {
        text = substitute_characters(&text, &asset.characters);
        if asset.scene.is_some() || !asset.props.is_empty() {
            let scene = asset.scene.clone().unwrap_or_default();
            let props = asset.props.join(", ");
            text.push_str(&format!(" [Scene: {scene} | Props: {props}]"));
        }
    }

    if let Some(intent) = &segment.director_intent {
        text.push_str(&format!(" (Director Note: {intent})"));
    }

    collapse_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::storyboard::{Asset, Resolution};

    fn segment(prompt: &str, asset: Option<Asset>, director_intent: Option<&str>) -> Segment {
        Segment {
            segment_index: 1,
            prompt_text: prompt.to_string(),
            image_url: None,
            duration_seconds: 10,
            resolution: Resolution::Horizontal,
            is_pro: false,
            director_intent: director_intent.map(str::to_string),
            asset,
        }
    }

    #[test]
    fn substitutes_unambiguous_character_name() {
        let asset = Asset {
            characters: vec![CharacterRef { name: "Maya".to_string(), id: Some("char_maya".to_string()) }],
            scene: None,
            props: vec![],
        };
        let full = build_full_prompt(&segment("Maya walks into the room", Some(asset), None));
        assert_eq!(full, "[@char_maya] walks into the room");
    }

    #[test]
    fn longest_name_wins_over_substring() {
        let asset = Asset {
            characters: vec![
                CharacterRef { name: "Maya".to_string(), id: Some("char_maya".to_string()) },
                CharacterRef { name: "Maya Lin".to_string(), id: Some("char_maya_lin".to_string()) },
            ],
            scene: None,
            props: vec![],
        };
        let full = build_full_prompt(&segment("Maya Lin enters", Some(asset), None));
        assert_eq!(full, "[@char_maya_lin] enters");
    }

    #[test]
    fn quoted_occurrences_are_exempt() {
        let asset = Asset {
            characters: vec![CharacterRef { name: "Maya".to_string(), id: Some("char_maya".to_string()) }],
            scene: None,
            props: vec![],
        };
        let full = build_full_prompt(&segment(r#"He said "Maya" then Maya left"#, Some(asset), None));
        assert_eq!(full, r#"He said "Maya" then [@char_maya] left"#);
    }

    #[test]
    fn cjk_quotes_are_exempt() {
        let asset = Asset {
            characters: vec![CharacterRef { name: "Maya".to_string(), id: Some("char_maya".to_string()) }],
            scene: None,
            props: vec![],
        };
        let full = build_full_prompt(&segment("\u{300c}Maya\u{300d} waves to Maya", Some(asset), None));
        assert_eq!(full, "\u{300c}Maya\u{300d} waves to [@char_maya]");
    }

    #[test]
    fn character_with_no_id_is_left_untouched() {
        let asset = Asset {
            characters: vec![CharacterRef { name: "Maya".to_string(), id: None }],
            scene: None,
            props: vec![],
        };
        let full = build_full_prompt(&segment("Maya waves", Some(asset), None));
        assert_eq!(full, "Maya waves");
    }

    #[test]
    fn scene_and_props_and_director_note_are_appended() {
        let asset = Asset { characters: vec![], scene: Some("rooftop".to_string()), props: vec!["umbrella".to_string(), "lantern".to_string()] };
        let full = build_full_prompt(&segment("A quiet walk", Some(asset), Some("slow motion")));
        assert_eq!(full, "A quiet walk [Scene: rooftop | Props: umbrella, lantern] (Director Note: slow motion)");
    }

    #[test]
    fn whitespace_is_collapsed() {
        let full = build_full_prompt(&segment("A   cat   sits\n\ndown", None, None));
        assert_eq!(full, "A cat sits down");
    }

    #[test]
    fn no_asset_no_director_intent_returns_collapsed_prompt_only() {
        let full = build_full_prompt(&segment("  plain prompt  ", None, None));
        assert_eq!(full, "plain prompt");
    }
}
