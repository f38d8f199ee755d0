//! Tables that pack two logical columns into each physical cell.
//!
//! Seen on pages such as Armenian, where a row is `<td>1գիր</td><td>kʰiɾ&nbsp;writing</td>`
//! under a four-column header. Values are split on structure (line breaks,
//! non-breaking spaces, script boundaries), never by column index.

use std::sync::LazyLock;

use regex::Regex;

use super::ParsedEntry;
use crate::html::Cell;

static ENTRY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*(.*)$").expect("static regex"));

const NBSP: char = '\u{a0}';

/// A header of at least four cells over data rows of at most two cells.
pub(crate) fn is_merged(headers: &[String], rows: &[Vec<Cell>]) -> bool {
    let sample: Vec<usize> = rows.iter().take(5).map(Vec::len).collect();
    headers.len() >= 4
        && !sample.is_empty()
        && sample.iter().all(|&n| n <= 2)
        && sample.iter().any(|&n| n == 2)
}

/// Split one merged row, or `None` when it does not start with an entry number.
pub(crate) fn split_row(row: &[Cell]) -> Option<ParsedEntry> {
    let [left, right] = row else {
        return None;
    };

    let (entry_number, orthography) = split_entry(left)?;
    let (ipa, gloss) = split_transcription(right);

    Some(ParsedEntry {
        entry_number: Some(entry_number),
        ipa,
        gloss,
        orthography,
        sound: None,
    })
}

fn split_entry(cell: &Cell) -> Option<(u32, Option<String>)> {
    if let [first, second, ..] = cell.lines.as_slice() {
        if let Ok(n) = first.trim().parse() {
            return Some((n, non_empty(second)));
        }
    }
    let caps = ENTRY_PREFIX.captures(cell.text.trim())?;
    let n = caps[1].parse().ok()?;
    Some((n, non_empty(&caps[2])))
}

fn split_transcription(cell: &Cell) -> (Option<String>, Option<String>) {
    if let [first, rest @ ..] = cell.lines.as_slice() {
        if !rest.is_empty() {
            return (non_empty(first), non_empty(&rest.join(" ")));
        }
    }

    let text = cell.text.as_str();
    if let Some((ipa, gloss)) = text.split_once(NBSP) {
        return (non_empty(ipa), non_empty(gloss));
    }

    // Last space that directly follows a non-ASCII character.
    let split = text
        .char_indices()
        .zip(text.chars().skip(1))
        .filter(|&((_, prev), next)| !prev.is_ascii() && next == ' ')
        .map(|((i, prev), _)| i + prev.len_utf8())
        .last();

    match split {
        Some(at) => (non_empty(&text[..at]), non_empty(&text[at..])),
        None => (non_empty(text), None),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}
