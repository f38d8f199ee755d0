//! Small helpers over `scraper` shared by the page parsers.

use reqwest::Url;
use scraper::{ElementRef, Node, Selector};

/// Build a selector from a literal.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// Resolve `href` against `base`, dropping any `#fragment`.
pub(crate) fn resolve(base: &str, href: &str) -> Option<String> {
    let mut url = Url::parse(base).ok()?.join(href.trim()).ok()?;
    url.set_fragment(None);
    Some(url.into())
}

/// Last path segment of a URL or href, e.g. the filename of an audio link.
pub(crate) fn last_segment(href: &str) -> &str {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/').next().unwrap_or(path)
}

/// One table cell flattened to text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Cell {
    /// Whitespace-collapsed text. Non-breaking spaces survive.
    pub text: String,
    /// The same text split at `<br>`, empty lines dropped.
    pub lines: Vec<String>,
    pub links: Vec<String>,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub(crate) fn cell(el: ElementRef<'_>) -> Cell {
    let mut raw_lines = vec![String::new()];
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => {
                if let Some(line) = raw_lines.last_mut() {
                    line.push_str(text);
                }
            }
            Node::Element(e) if e.name() == "br" => raw_lines.push(String::new()),
            _ => {}
        }
    }

    let lines: Vec<String> = raw_lines
        .iter()
        .map(|l| squash(l))
        .filter(|l| !l.is_empty())
        .collect();

    let link_sel = selector("a[href]");
    let links = el
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect();

    Cell {
        text: lines.join(" "),
        lines,
        links,
    }
}

/// Rows of a table as cells (`td` and `th`, direct children of each `tr`).
///
/// Only the table's own rows count; rows of a table nested in one of its
/// cells stay inside that cell's text.
pub(crate) fn table_rows(table: ElementRef<'_>) -> Vec<Vec<Cell>> {
    own_rows(table)
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(cell)
                .collect()
        })
        .collect()
}

/// `tr` children of the table and of its `thead`/`tbody`/`tfoot` sections.
fn own_rows<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    let children = |el: ElementRef<'a>| el.children().filter_map(ElementRef::wrap);
    children(table).flat_map(move |child| {
        let rows: Vec<ElementRef<'a>> = match child.value().name() {
            "tr" => vec![child],
            "thead" | "tbody" | "tfoot" => children(child)
                .filter(|row| row.value().name() == "tr")
                .collect(),
            _ => Vec::new(),
        };
        rows
    })
}

/// Collapse runs of ASCII whitespace to one space and trim every kind of
/// whitespace from the ends. Non-breaking spaces inside the text survive.
pub(crate) fn squash(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    let trimmed = out.trim_matches(char::is_whitespace);
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_cell(html: &str) -> Cell {
        let doc = Html::parse_fragment(html);
        let td = selector("td");
        let el = doc.select(&td).next().expect("fixture has a cell");
        cell(el)
    }

    #[test]
    fn cells_keep_br_lines_and_nbsp() {
        let c = first_cell(
            "<table><tr><td> 12<br>  gir\n </td></tr></table>",
        );
        assert_eq!(c.lines, vec!["12", "gir"]);
        assert_eq!(c.text, "12 gir");

        let c = first_cell("<table><tr><td>kʰiɾ\u{a0}writing</td></tr></table>");
        assert_eq!(c.text, "kʰiɾ\u{a0}writing");
    }

    #[test]
    fn cells_trim_non_breaking_spaces_at_the_edges() {
        assert_eq!(first_cell("<table><tr><td>&nbsp;</td></tr></table>").text, "");
        assert!(first_cell("<table><tr><td>&nbsp;</td></tr></table>").is_empty());
        assert_eq!(first_cell("<table><tr><td>&nbsp;3</td></tr></table>").text, "3");
        assert_eq!(
            first_cell("<table><tr><td>\u{a0} duɾ&nbsp;door \u{2003}</td></tr></table>").text,
            "duɾ\u{a0}door"
        );
    }

    #[test]
    fn nested_table_rows_stay_in_their_cell() {
        let doc = Html::parse_document(
            "<table>
               <tr><td>1</td><td>ma<table><tr><td>note</td></tr><tr><td>more</td></tr></table></td></tr>
               <tr><td>2</td><td>pa</td></tr>
             </table>",
        );
        let table = selector("table");
        let outer = doc.select(&table).next().expect("fixture has a table");
        let rows = table_rows(outer);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0][1].text, "manotemore");
        assert_eq!(rows[1][0].text, "2");
    }

    #[test]
    fn cells_collect_links() {
        let c = first_cell(
            r#"<table><tr><td><a href="a.wav">sound</a> <a name="x">n</a></td></tr></table>"#,
        );
        assert_eq!(c.links, vec!["a.wav"]);
        assert_eq!(c.text, "sound n");
    }

    #[test]
    fn resolve_joins_relative_paths_and_drops_fragments() {
        let base = "https://archive.test/Language%20Indices/index_available.htm";
        assert_eq!(
            resolve(base, "../Language/ABQ/abq.html#top").as_deref(),
            Some("https://archive.test/Language/ABQ/abq.html")
        );
    }

    #[test]
    fn last_segment_strips_query() {
        assert_eq!(last_segment("../ABQ/abq_word-list_1992_01.wav?x=1"), "abq_word-list_1992_01.wav");
        assert_eq!(last_segment("plain.wav"), "plain.wav");
    }
}
