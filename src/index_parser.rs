use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use crate::html::{resolve, selector, squash};
use crate::records::{Language, language_code};

static LANGUAGE_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.\./Language/([A-Z0-9]+)/[\w.-]+\.html?").expect("static regex")
});

/// Extract the language catalog from the archive's listing page.
///
/// Codes are upper-cased and the first link for a code wins. Links without
/// visible text are skipped.
pub fn parse_index(html: &str, page_url: &str) -> Vec<Language> {
    let doc = Html::parse_document(html);
    let links = selector("a[href]");
    let mut seen = HashSet::new();

    doc.select(&links)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let caps = LANGUAGE_HREF.captures(href)?;
            let code = language_code(&caps[1]);
            let name = squash(&a.text().collect::<String>());
            if name.is_empty() || !seen.insert(code.clone()) {
                return None;
            }
            Some(Language {
                url: resolve(page_url, href)?,
                code,
                name,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_URL: &str = "https://archive.test/Language%20Indices/index_available.htm";

    #[test]
    fn extracts_codes_names_and_urls() {
        let html = r#"
            <ul>
              <li><a href="../Language/ABQ/abq.html">Abaza</a></li>
              <li><a href="../Language/hye/hye.htm">Armenian</a></li>
              <li><a href="../Language/ABQ/abq.html">Abaza again</a></li>
              <li><a href="../Language/ZUL/zul.html"> </a></li>
              <li><a href="/about.html">About</a></li>
            </ul>"#;

        let langs = parse_index(html, INDEX_URL);
        assert_eq!(langs.len(), 2);
        assert_eq!(langs[0].code, "ABQ");
        assert_eq!(langs[0].name, "Abaza");
        assert_eq!(langs[0].url, "https://archive.test/Language/ABQ/abq.html");
        assert_eq!(langs[1].code, "HYE");
        assert_eq!(langs[1].url, "https://archive.test/Language/hye/hye.htm");
    }

    #[test]
    fn empty_page_has_no_languages() {
        assert!(parse_index("", INDEX_URL).is_empty());
    }
}
