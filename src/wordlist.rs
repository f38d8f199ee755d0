//! Word-list page parsing.
//!
//! A word-list page holds one table of numbered words, but every language
//! page was typed up by hand: headers may be missing, columns come in any
//! order, and some pages pack two fields per cell. [`parse_wordlist`] picks
//! the word table, decides how to read it once, and then hands out entries
//! lazily through [`WordlistTable::entries`].

pub mod columns;
mod merged;
pub mod numbering;

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use crate::html::{Cell, selector, table_rows};
use crate::records::ColumnLayout;
use columns::{ColumnMap, TableView, classify};

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)").expect("static regex"));

/// Bonus for each of the first two data rows that starts with a number.
const NUMBERED_ROW_BONUS: usize = 50;

/// One word-list row before entry numbers are settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub entry_number: Option<u32>,
    pub ipa: Option<String>,
    pub gloss: Option<String>,
    pub orthography: Option<String>,
    pub sound: Option<String>,
}

/// Why a page produced no table to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTable {
    EmptyPage,
    NoTable,
    TooFewRows,
    UnknownLayout,
}

impl std::fmt::Display for NoTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EmptyPage => "empty page",
            Self::NoTable => "no table on page",
            Self::TooFewRows => "table has fewer than two rows",
            Self::UnknownLayout => "no column layout recognised",
        })
    }
}

#[derive(Debug)]
pub enum WordlistPage {
    Table(WordlistTable),
    Empty(NoTable),
}

#[derive(Debug, Clone, Copy)]
enum RowPlan {
    Columns(ColumnMap),
    Merged,
}

/// A word table whose reading plan has been decided.
#[derive(Debug)]
pub struct WordlistTable {
    rows: Vec<Vec<Cell>>,
    plan: RowPlan,
    layout: ColumnLayout,
}

impl WordlistTable {
    pub fn layout(&self) -> ColumnLayout {
        self.layout
    }

    /// Entries in table order. Rows that cannot be read are skipped one by one.
    pub fn entries(&self) -> impl Iterator<Item = ParsedEntry> + '_ {
        self.rows.iter().filter_map(move |row| match self.plan {
            RowPlan::Columns(map) => read_row(row, &map),
            RowPlan::Merged => merged::split_row(row),
        })
    }
}

pub fn parse_wordlist(html: &str) -> WordlistPage {
    if html.trim().is_empty() {
        return WordlistPage::Empty(NoTable::EmptyPage);
    }

    let doc = Html::parse_document(html);
    let table_sel = selector("table");
    let Some(mut rows) = doc
        .select(&table_sel)
        .map(table_rows)
        .max_by_key(|rows| table_score(rows))
    else {
        return WordlistPage::Empty(NoTable::NoTable);
    };

    rows.retain(|row| row.iter().any(|c| !c.is_empty()));
    if rows.len() < 2 {
        return WordlistPage::Empty(NoTable::TooFewRows);
    }

    // A first row that already starts with a number is data, not a header.
    let headers: Vec<String> = if starts_with_number(&rows[0]) {
        Vec::new()
    } else {
        rows.remove(0).into_iter().map(|c| c.text).collect()
    };

    if merged::is_merged(&headers, &rows) {
        return WordlistPage::Table(WordlistTable {
            rows,
            plan: RowPlan::Merged,
            layout: ColumnLayout::Merged,
        });
    }

    let classified = classify(&TableView::new(&headers, &rows));
    match classified {
        Some((map, layout)) => WordlistPage::Table(WordlistTable {
            rows,
            plan: RowPlan::Columns(map),
            layout,
        }),
        None => WordlistPage::Empty(NoTable::UnknownLayout),
    }
}

/// Row count, plus a bonus for data rows that look numbered.
fn table_score(rows: &[Vec<Cell>]) -> usize {
    let numbered = rows
        .iter()
        .skip(1)
        .take(2)
        .filter(|row| starts_with_number(row))
        .count();
    rows.len() + NUMBERED_ROW_BONUS * numbered
}

fn starts_with_number(row: &[Cell]) -> bool {
    row.first()
        .is_some_and(|c| c.text.trim().starts_with(|ch: char| ch.is_ascii_digit()))
}

fn read_row(row: &[Cell], map: &ColumnMap) -> Option<ParsedEntry> {
    let text = |col: Option<usize>| -> Option<String> {
        let t = row.get(col?)?.text.trim();
        (!t.is_empty()).then(|| t.to_string())
    };

    let entry_number = match map.entry.and_then(|c| row.get(c)).map(|c| c.text.trim()) {
        Some(cell) if !cell.is_empty() => {
            // Non-numeric or overflowing entry cells mark rows that are not words.
            let caps = LEADING_NUMBER.captures(cell)?;
            Some(caps[1].parse().ok()?)
        }
        _ => None,
    };

    let ipa = text(Some(map.ipa));
    let gloss = text(map.gloss);
    if ipa.is_none() && gloss.is_none() {
        return None;
    }

    Some(ParsedEntry {
        entry_number,
        ipa,
        gloss,
        orthography: text(map.orthography),
        sound: text(map.sound),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(page: &str) -> WordlistTable {
        match parse_wordlist(page) {
            WordlistPage::Table(t) => t,
            WordlistPage::Empty(why) => panic!("expected a table, got {why:?}"),
        }
    }

    #[test]
    fn empty_body_is_missing() {
        assert!(matches!(
            parse_wordlist("   "),
            WordlistPage::Empty(NoTable::EmptyPage)
        ));
        assert!(matches!(
            parse_wordlist("<html><body><p>Not found</p></body></html>"),
            WordlistPage::Empty(NoTable::NoTable)
        ));
    }

    #[test]
    fn three_column_table() {
        let t = table(
            r#"<table>
                <tr><th>Entry</th><th>Abaza</th><th>English</th></tr>
                <tr><td>1</td><td>aʃʷa</td><td>song</td></tr>
                <tr><td>2</td><td>apʰa</td><td>son</td></tr>
                <tr><td>3</td><td>ɑd͡ʒ</td><td>oak</td></tr>
            </table>"#,
        );
        let entries: Vec<_> = t.entries().collect();
        assert_eq!(t.layout(), ColumnLayout::IpaDensity);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].ipa.as_deref(), Some("aʃʷa"));
        assert_eq!(entries[0].gloss.as_deref(), Some("song"));
        assert_eq!(entries[2].entry_number, Some(3));
    }

    #[test]
    fn four_column_table() {
        let t = table(
            r#"<table>
                <tr><td>Entry</td><td>Orthography</td><td>Phonetic transcription</td><td>English gloss</td></tr>
                <tr><td>1</td><td>gir</td><td>kʰiɾ</td><td>writing</td></tr>
                <tr><td>2</td><td>dur</td><td>duɾ</td><td>door</td></tr>
            </table>"#,
        );
        let entries: Vec<_> = t.entries().collect();
        assert_eq!(t.layout(), ColumnLayout::Header);
        assert_eq!(entries[1].orthography.as_deref(), Some("dur"));
        assert_eq!(entries[1].ipa.as_deref(), Some("duɾ"));
        assert_eq!(entries[1].gloss.as_deref(), Some("door"));
    }

    #[test]
    fn five_column_table_without_headers() {
        let t = table(
            r#"<table>
                <tr><td>1</td><td>bala</td><td>house</td><td>Bala</td><td><a href="1.wav">wav</a></td></tr>
                <tr><td>2</td><td>kuta</td><td>dog</td><td>Kuta</td><td><a href="2.wav">wav</a></td></tr>
                <tr><td>3</td><td>mira</td><td>sun</td><td>Mira</td><td><a href="3.wav">wav</a></td></tr>
            </table>"#,
        );
        let entries: Vec<_> = t.entries().collect();
        assert_eq!(t.layout(), ColumnLayout::Positional);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].entry_number, Some(1));
        assert_eq!(entries[0].ipa.as_deref(), Some("bala"));
        assert_eq!(entries[0].gloss.as_deref(), Some("house"));
        assert_eq!(entries[0].orthography.as_deref(), Some("Bala"));
    }

    #[test]
    fn merged_cell_table() {
        let t = table(
            "<table>
                <tr><td>Entry</td><td>Orthography</td><td>Transcription</td><td>English</td></tr>
                <tr><td>1գիր</td><td>kʰiɾ\u{a0}writing</td></tr>
                <tr><td>2դուռ</td><td>duɾ\u{a0}door</td></tr>
            </table>",
        );
        let entries: Vec<_> = t.entries().collect();
        assert_eq!(t.layout(), ColumnLayout::Merged);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ipa.as_deref(), Some("kʰiɾ"));
        assert_eq!(entries[0].gloss.as_deref(), Some("writing"));
        assert_eq!(entries[1].orthography.as_deref(), Some("դուռ"));
    }

    #[test]
    fn malformed_rows_are_skipped_individually() {
        let t = table(
            r#"<table>
                <tr><th>#</th><th>Transcription</th><th>English</th></tr>
                <tr><td>1</td><td>ma</td><td>mother</td></tr>
                <tr><td>see note</td><td>xx</td><td>yy</td></tr>
                <tr><td>99999999999</td><td>pa</td><td>father</td></tr>
                <tr><td>3</td><td></td><td></td></tr>
                <tr><td></td><td>ʔa</td><td>yes</td></tr>
                <tr><td>5</td><td>na</td><td>no</td></tr>
            </table>"#,
        );
        let entries: Vec<_> = t.entries().collect();
        let numbers: Vec<_> = entries.iter().map(|e| e.entry_number).collect();
        assert_eq!(numbers, vec![Some(1), None, Some(5)]);
    }

    #[test]
    fn blank_looking_entry_cells_get_positional_numbers() {
        let t = table(
            r#"<table>
                <tr><th>Entry</th><th>Transcription</th><th>English</th></tr>
                <tr><td>1</td><td>ʔa</td><td>one</td></tr>
                <tr><td>&nbsp;</td><td>ʔb</td><td>two</td></tr>
                <tr><td>&nbsp;3</td><td>ʔc</td><td>three</td></tr>
            </table>"#,
        );
        let entries: Vec<_> = t.entries().collect();
        let parsed: Vec<_> = entries
            .iter()
            .map(|e| (e.entry_number, e.ipa.as_deref()))
            .collect();
        assert_eq!(
            parsed,
            vec![(Some(1), Some("ʔa")), (None, Some("ʔb")), (Some(3), Some("ʔc"))]
        );

        let numbered = numbering::assign_numbers(entries, t.layout());
        let numbers: Vec<_> = numbered.iter().map(|e| e.entry_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn nested_note_tables_do_not_add_rows() {
        let t = table(
            r#"<table>
                <tr><th>Entry</th><th>Transcription</th><th>English</th></tr>
                <tr><td>1</td><td>ma</td><td>mother<table><tr><td>7</td><td>ʔx</td><td>see</td></tr></table></td></tr>
                <tr><td>2</td><td>pa</td><td>father</td></tr>
            </table>"#,
        );
        let numbers: Vec<_> = t.entries().map(|e| e.entry_number).collect();
        assert_eq!(numbers, vec![Some(1), Some(2)]);
    }

    #[test]
    fn prefers_the_numbered_table() {
        let t = table(
            r#"<table><tr><td>menu</td></tr><tr><td>a</td></tr><tr><td>b</td></tr><tr><td>c</td></tr></table>
               <table>
                 <tr><th>Entry</th><th>Transcription</th><th>English</th></tr>
                 <tr><td>1</td><td>ma</td><td>mother</td></tr>
                 <tr><td>2</td><td>pa</td><td>father</td></tr>
               </table>"#,
        );
        assert_eq!(t.entries().count(), 2);
    }
}
