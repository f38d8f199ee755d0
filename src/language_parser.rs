//! Recording descriptors from a language page.
//!
//! A language page lists its recordings in one table: a WAV link, the
//! entry range spoken, the word-list page link and free-text speaker notes.
//! Layouts vary, so every column is found by content rather than position.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use crate::html::{Cell, last_segment, resolve, selector, table_rows};
use crate::records::RecordingDescriptor;

static WORDLIST_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(word-list|sentence|story|conversation|narrative).*\.html?")
        .expect("static regex")
});

static ENTRY_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*[-–]\s*(\d+)$").expect("static regex"));

static BARE_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z]{2,3}_[\w-]+_\d{4}_\d{2})(\.wav)?$").expect("static regex")
});

static YEAR_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)_(\d{4})_(\d{2})(\.wav)?$").expect("static regex"));

const MIN_INFO_LEN: usize = 15;

/// Parse every recording row of a language page.
pub fn parse_language_page(html: &str, page_url: &str) -> Vec<RecordingDescriptor> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table");
    let tables: Vec<_> = doc.select(&table_sel).collect();

    let chosen = tables
        .iter()
        .find(|t| {
            let text = t.text().collect::<String>().to_lowercase();
            text.contains("wav") && ["word", "audio", "entries"].iter().any(|k| text.contains(k))
        })
        .or_else(|| tables.iter().max_by_key(|t| table_rows(**t).len()));

    let Some(table) = chosen else {
        return Vec::new();
    };

    let rows = table_rows(*table);
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };

    let info_col = header.iter().position(|c| {
        let h = c.text.to_lowercase();
        ["additional", "speaker", "info"].iter().any(|k| h.contains(k))
    });

    body.iter()
        .filter(|row| row.len() >= 4)
        .filter_map(|row| parse_row(row, info_col, page_url))
        .collect()
}

fn parse_row(row: &[Cell], info_col: Option<usize>, page_url: &str) -> Option<RecordingDescriptor> {
    let links = || row.iter().flat_map(|c| c.links.iter());

    let mut desc = RecordingDescriptor::default();

    if let Some(href) = links().find(|h| last_segment(h).to_lowercase().ends_with(".wav")) {
        desc.filename = last_segment(href).to_string();
        desc.audio_url = resolve(page_url, href);
    } else {
        let caps = row
            .iter()
            .find_map(|c| BARE_FILENAME.captures(&c.text))?;
        desc.filename = format!("{}.wav", &caps[1]);
        desc.audio_url = resolve(page_url, &desc.filename);
    }

    desc.wordlist_url = links()
        .find(|h| WORDLIST_HREF.is_match(h))
        .and_then(|h| resolve(page_url, h));

    if let Some(caps) = row.iter().find_map(|c| ENTRY_RANGE.captures(&c.text)) {
        desc.entry_start = caps[1].parse().ok();
        desc.entry_end = caps[2].parse().ok();
    }

    if let Some(caps) = YEAR_SEQUENCE.captures(&desc.filename) {
        desc.year = caps[1].parse().ok();
        desc.sequence = caps[2].parse().ok();
    }

    desc.additional_info = info_col
        .and_then(|i| row.get(i))
        .filter(|c| !c.is_empty())
        .or_else(|| row.iter().find(|c| looks_like_note(c)))
        .map(|c| c.text.clone());

    Some(desc)
}

fn looks_like_note(cell: &Cell) -> bool {
    cell.links.is_empty()
        && cell.text.chars().count() > MIN_INFO_LEN
        && !BARE_FILENAME.is_match(&cell.text)
        && !cell
            .text
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_punctuation() || c.is_whitespace())
}
