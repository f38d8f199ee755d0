//! Column role assignment for word-list tables.
//!
//! Each classifier looks at the table independently and either commits to a
//! full [`ColumnMap`] or abstains; [`classify`] takes the first that commits.

use crate::html::Cell;
use crate::records::ColumnLayout;

/// Rows inspected when scoring column contents.
const SAMPLE_ROWS: usize = 20;

/// Minimum share of non-empty cells carrying IPA symbols for a column to count as IPA.
pub const IPA_DENSITY_THRESHOLD: f64 = 0.3;

/// Share of sampled cells that must start with a digit for the entry column.
const NUMERIC_COLUMN_SHARE: f64 = 0.6;

/// Where each logical field lives in a physical row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub entry: Option<usize>,
    pub ipa: usize,
    pub gloss: Option<usize>,
    pub orthography: Option<usize>,
    pub sound: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Entry,
    Ipa,
    Gloss,
    Orthography,
    Sound,
}

/// A table as the classifiers see it.
pub struct TableView<'a> {
    pub headers: &'a [String],
    pub rows: &'a [Vec<Cell>],
    pub n_cols: usize,
    hints: Hints,
}

/// Facts every classifier may lean on.
#[derive(Debug, Default)]
struct Hints {
    entry: Option<usize>,
    header_ipa: Option<usize>,
    header_gloss: Option<usize>,
    header_orthography: Option<usize>,
    header_sound: Option<usize>,
}

impl<'a> TableView<'a> {
    pub fn new(headers: &'a [String], rows: &'a [Vec<Cell>]) -> Self {
        let n_cols = rows
            .iter()
            .take(5)
            .map(Vec::len)
            .chain(std::iter::once(headers.len()))
            .max()
            .unwrap_or(0);

        let mut view = Self {
            headers,
            rows,
            n_cols,
            hints: Hints::default(),
        };
        view.hints = view.compute_hints();
        view
    }

    fn compute_hints(&self) -> Hints {
        let mut hints = Hints::default();
        for (i, header) in self.headers.iter().enumerate() {
            let slot = match header_role(header) {
                Some(Role::Entry) => &mut hints.entry,
                Some(Role::Ipa) => &mut hints.header_ipa,
                Some(Role::Gloss) => &mut hints.header_gloss,
                Some(Role::Orthography) => &mut hints.header_orthography,
                Some(Role::Sound) => &mut hints.header_sound,
                None => continue,
            };
            slot.get_or_insert(i);
        }
        if hints.entry.is_none() {
            hints.entry = (0..self.n_cols).find(|&c| self.is_numeric_column(c));
        }
        hints
    }

    fn sample(&self, col: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows
            .iter()
            .take(SAMPLE_ROWS)
            .filter_map(move |row| row.get(col))
            .filter(|cell| !cell.is_empty())
    }

    fn is_numeric_column(&self, col: usize) -> bool {
        let (total, numeric) = self.sample(col).fold((0usize, 0usize), |(t, n), cell| {
            let digit = cell.text.starts_with(|c: char| c.is_ascii_digit());
            (t + 1, n + usize::from(digit))
        });
        total > 0 && numeric as f64 / total as f64 >= NUMERIC_COLUMN_SHARE
    }

    /// Share of non-empty cells with at least one IPA symbol.
    fn ipa_density(&self, col: usize) -> f64 {
        let (total, hits) = self.sample(col).fold((0usize, 0usize), |(t, h), cell| {
            (t + 1, h + usize::from(cell.text.chars().any(is_ipa_char)))
        });
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Share of non-whitespace characters outside ASCII.
    fn non_ascii_density(&self, col: usize) -> f64 {
        let (total, wide) = self
            .sample(col)
            .flat_map(|cell| cell.text.chars())
            .filter(|c| !c.is_whitespace())
            .fold((0usize, 0usize), |(t, w), c| (t + 1, w + usize::from(!c.is_ascii())));
        if total == 0 {
            0.0
        } else {
            wide as f64 / total as f64
        }
    }

    fn has_ascii_letters(&self, col: usize) -> bool {
        self.sample(col)
            .any(|cell| cell.text.chars().any(|c| c.is_ascii_alphabetic()))
    }

    /// Columns not already claimed by the entry number or a non-IPA header.
    fn open_columns(&self) -> Vec<usize> {
        let h = &self.hints;
        (0..self.n_cols)
            .filter(|c| {
                ![h.entry, h.header_gloss, h.header_orthography, h.header_sound].contains(&Some(*c))
            })
            .collect()
    }

    /// The header gloss column, else the least non-ASCII column with English-looking text.
    fn pick_gloss(&self, candidates: &[usize]) -> Option<usize> {
        if self.hints.header_gloss.is_some() {
            return self.hints.header_gloss;
        }
        candidates
            .iter()
            .copied()
            .filter(|&c| self.has_ascii_letters(c))
            .map(|c| (c, self.non_ascii_density(c)))
            // Replacing on equal density keeps the rightmost column.
            .fold(None, |best: Option<(usize, f64)>, (c, d)| match best {
                Some((_, bd)) if bd < d => best,
                _ => Some((c, d)),
            })
            .map(|(c, _)| c)
    }

    fn map_with(&self, ipa: usize, gloss: Option<usize>) -> ColumnMap {
        ColumnMap {
            entry: self.hints.entry,
            ipa,
            gloss,
            orthography: self.hints.header_orthography,
            sound: self.hints.header_sound,
        }
    }
}

pub trait ColumnStrategy {
    fn layout(&self) -> ColumnLayout;

    /// A confident assignment, or `None` for no opinion.
    fn assign(&self, table: &TableView<'_>) -> Option<ColumnMap>;
}

/// Header cells matched against known vocabularies.
pub struct HeaderMatch;

/// The column richest in IPA symbols is the transcription.
pub struct IpaDensity;

/// For script-specific transcriptions outside the IPA blocks.
pub struct NonAsciiDensity;

/// Fixed (entry, IPA, gloss, [orthography], [audio]) layout for bare 3-5 column tables.
pub struct Positional;

pub const STRATEGIES: &[&dyn ColumnStrategy] =
    &[&HeaderMatch, &IpaDensity, &NonAsciiDensity, &Positional];

/// Run the classifiers in order; the first confident one wins.
pub fn classify(table: &TableView<'_>) -> Option<(ColumnMap, ColumnLayout)> {
    STRATEGIES
        .iter()
        .find_map(|s| s.assign(table).map(|map| (map, s.layout())))
}

impl ColumnStrategy for HeaderMatch {
    fn layout(&self) -> ColumnLayout {
        ColumnLayout::Header
    }

    fn assign(&self, table: &TableView<'_>) -> Option<ColumnMap> {
        let ipa = table.hints.header_ipa?;
        let gloss = table.hints.header_gloss?;
        if ipa == gloss || gloss >= table.n_cols {
            return None;
        }
        Some(table.map_with(ipa, Some(gloss)))
    }
}

impl ColumnStrategy for IpaDensity {
    fn layout(&self) -> ColumnLayout {
        ColumnLayout::IpaDensity
    }

    fn assign(&self, table: &TableView<'_>) -> Option<ColumnMap> {
        let open = table.open_columns();
        let (ipa, _) = open
            .iter()
            .map(|&c| (c, table.ipa_density(c)))
            .filter(|&(_, d)| d > IPA_DENSITY_THRESHOLD)
            // Only a strictly denser column replaces the best, so ties keep the leftmost.
            .fold(None, |best: Option<(usize, f64)>, (c, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((c, d)),
            })?;

        let rest: Vec<usize> = open.into_iter().filter(|&c| c != ipa).collect();
        Some(table.map_with(ipa, table.pick_gloss(&rest)))
    }
}

impl ColumnStrategy for NonAsciiDensity {
    fn layout(&self) -> ColumnLayout {
        ColumnLayout::NonAscii
    }

    fn assign(&self, table: &TableView<'_>) -> Option<ColumnMap> {
        let open = table.open_columns();
        let (ipa, ipa_density) = open
            .iter()
            .map(|&c| (c, table.non_ascii_density(c)))
            .filter(|&(_, d)| d > 0.0)
            .fold(None, |best: Option<(usize, f64)>, (c, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((c, d)),
            })?;

        let rest: Vec<usize> = open.into_iter().filter(|&c| c != ipa).collect();
        let gloss = table.pick_gloss(&rest)?;
        if table.non_ascii_density(gloss) >= ipa_density {
            return None;
        }
        Some(table.map_with(ipa, Some(gloss)))
    }
}

impl ColumnStrategy for Positional {
    fn layout(&self) -> ColumnLayout {
        ColumnLayout::Positional
    }

    fn assign(&self, table: &TableView<'_>) -> Option<ColumnMap> {
        if !(3..=5).contains(&table.n_cols) {
            return None;
        }
        Some(ColumnMap {
            entry: Some(0),
            ipa: 1,
            gloss: Some(2),
            orthography: (table.n_cols >= 4).then_some(3),
            sound: None,
        })
    }
}

fn header_role(header: &str) -> Option<Role> {
    let h = header.trim().to_lowercase();
    if h.is_empty() {
        return None;
    }
    let words: Vec<&str> = h
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if h.contains("transcription") || h.contains("phonetic") || words.contains(&"ipa") {
        Some(Role::Ipa)
    } else if ["english", "gloss", "meaning", "translation"]
        .iter()
        .any(|k| h.contains(k))
    {
        Some(Role::Gloss)
    } else if h.contains("orthograph") || h.contains("spelling") {
        Some(Role::Orthography)
    } else if h.contains("sound") || h.contains("phoneme") {
        Some(Role::Sound)
    } else if matches!(h.as_str(), "#" | "no" | "no." | "nr" | "nr." | "number")
        || h.starts_with("entry")
    {
        Some(Role::Entry)
    } else {
        None
    }
}

/// Whether `c` belongs to the IPA symbol set, including diacritics and tone letters.
pub fn is_ipa_char(c: char) -> bool {
    matches!(
        u32::from(c),
        0x0190..=0x01FF   // Latin Extended-B phonetic letters and clicks
        | 0x0250..=0x02AF // IPA Extensions
        | 0x02B0..=0x02FF // spacing modifiers, length marks and tone letters
        | 0x0300..=0x036F // combining diacritics
        | 0x1D00..=0x1DBF // phonetic extensions
        | 0x2070..=0x209F // superscripts and subscripts
    ) || matches!(c, 'æ' | 'ð' | 'ø' | 'œ' | 'ħ' | 'ŋ' | 'θ' | 'β' | 'χ')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(text: &str) -> Cell {
        Cell {
            text: text.to_string(),
            lines: vec![text.to_string()],
            links: Vec::new(),
        }
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<Cell>> {
        data.iter()
            .map(|r| r.iter().map(|t| cell(t)).collect())
            .collect()
    }

    fn headers(h: &[&str]) -> Vec<String> {
        h.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn header_vocabulary() {
        assert_eq!(header_role("Phonetic Transcription"), Some(Role::Ipa));
        assert_eq!(header_role("IPA"), Some(Role::Ipa));
        assert_eq!(header_role("English gloss"), Some(Role::Gloss));
        assert_eq!(header_role("Orthography"), Some(Role::Orthography));
        assert_eq!(header_role("Sound illustrated"), Some(Role::Sound));
        assert_eq!(header_role("Entry"), Some(Role::Entry));
        assert_eq!(header_role("#"), Some(Role::Entry));
        assert_eq!(header_role("Abaza"), None);
        assert_eq!(header_role("Nipa"), None);
    }

    #[test]
    fn ipa_chars_cover_diacritics_and_tones() {
        for c in ['ʃ', 'ɛ', 'ː', '\u{0303}', '˥', 'ǀ', 'ʰ', 'ŋ', 'θ'] {
            assert!(is_ipa_char(c), "{c:?}");
        }
        for c in ['a', 'é', 'д', '1'] {
            assert!(!is_ipa_char(c), "{c:?}");
        }
    }

    #[test]
    fn headers_win_when_they_name_ipa_and_gloss() {
        let h = headers(&["Entry", "Orthography", "Transcription", "English"]);
        let r = rows(&[&["1", "gir", "kʰiɾ", "writing"], &["2", "dur", "duɾ", "door"]]);
        let view = TableView::new(&h, &r);
        let (map, layout) = classify(&view).expect("classified");
        assert_eq!(layout, ColumnLayout::Header);
        assert_eq!(map.entry, Some(0));
        assert_eq!(map.orthography, Some(1));
        assert_eq!((map.ipa, map.gloss), (2, Some(3)));
    }

    #[test]
    fn ipa_density_finds_unlabelled_transcriptions() {
        let h = headers(&["Entry", "Abaza", "English"]);
        let r = rows(&[
            &["1", "aʃʷa", "song"],
            &["2", "apʰa", "son"],
            &["3", "ɑd͡ʒ", "oak"],
        ]);
        let view = TableView::new(&h, &r);
        let (map, layout) = classify(&view).expect("classified");
        assert_eq!(layout, ColumnLayout::IpaDensity);
        assert_eq!((map.ipa, map.gloss), (1, Some(2)));
    }

    #[test]
    fn non_ascii_density_handles_scripts_outside_ipa() {
        let h = headers(&["No.", "Word", "Meaning"]);
        let r = rows(&[&["1", "дом", "house"], &["2", "кот", "cat"]]);
        let view = TableView::new(&h, &r);
        let (map, layout) = classify(&view).expect("classified");
        assert_eq!(layout, ColumnLayout::NonAscii);
        assert_eq!((map.ipa, map.gloss), (1, Some(2)));
    }

    #[test]
    fn positional_fallback_for_bare_five_columns() {
        let h = headers(&["", "", "", "", ""]);
        let r = rows(&[
            &["1", "bala", "house", "Bala", "wav"],
            &["2", "kuta", "dog", "Kuta", "wav"],
        ]);
        let view = TableView::new(&h, &r);
        let (map, layout) = classify(&view).expect("classified");
        assert_eq!(layout, ColumnLayout::Positional);
        assert_eq!((map.ipa, map.gloss, map.orthography), (1, Some(2), Some(3)));
    }

    #[test]
    fn two_column_ascii_tables_are_unclassified() {
        let h = headers(&["", ""]);
        let r = rows(&[&["1", "x"], &["2", "y"]]);
        assert!(classify(&TableView::new(&h, &r)).is_none());
    }
}
