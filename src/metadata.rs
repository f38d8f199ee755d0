//! The metadata phase: index → language pages → word-list pages.
//!
//! Runs on one HTTP session with the metadata request delay. Language pages
//! are re-scraped on every run (recordings are upserted, so download state
//! survives). Word-list pages are fetched only while their recording is
//! still `pending` or `fetch-failed`.

use std::time::Duration;

use uuid::Uuid;

use crate::http::{HttpClient, Transport, fetch_text};
use crate::index_parser::parse_index;
use crate::language_parser::parse_language_page;
use crate::opts::{Opts, RetryOpts};
use crate::records::{
    ColumnLayout, Language, Recording, RecordingKind, WordlistStatus, language_code,
};
use crate::store::Store;
use crate::summary::{Outcome, RunSummary};
use crate::wordlist::numbering::assign_numbers;
use crate::wordlist::{WordlistPage, parse_wordlist};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageOutcome {
    Parsed { recordings: usize },
    FetchFailed(String),
}

impl Outcome for LanguageOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Parsed { .. } => "language-parsed",
            Self::FetchFailed(_) => "language-fetch-failed",
        }
    }

    fn failure(&self) -> Option<String> {
        match self {
            Self::FetchFailed(reason) => Some(reason.clone()),
            Self::Parsed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordlistOutcome {
    Parsed {
        entries: usize,
        layout: ColumnLayout,
    },
    /// The page was reached but yielded nothing, or there is no page.
    NoEntries(String),
    FetchFailed(String),
}

impl WordlistOutcome {
    pub fn status(&self) -> WordlistStatus {
        match self {
            Self::Parsed { .. } => WordlistStatus::Parsed,
            Self::NoEntries(_) => WordlistStatus::NoEntries,
            Self::FetchFailed(_) => WordlistStatus::FetchFailed,
        }
    }
}

impl Outcome for WordlistOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Parsed { .. } => "wordlist-parsed",
            Self::NoEntries(_) => "wordlist-no-entries",
            Self::FetchFailed(_) => "wordlist-fetch-failed",
        }
    }

    fn failure(&self) -> Option<String> {
        match self {
            Self::FetchFailed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Run the metadata phase against `transport`.
pub fn run_metadata_with<T: Transport + ?Sized>(
    opts: &Opts,
    language: Option<&str>,
    transport: &mut T,
) -> Result<RunSummary> {
    let code = language.map(language_code);
    let language = code.as_deref();
    let run_id = Uuid::new_v4();
    let _span = tracing::info_span!("metadata", %run_id, language = language.unwrap_or("all"))
        .entered();

    let mut store = Store::open(&opts.db_path())?;
    let retry = &opts.download.retry;
    let mut summary = RunSummary::new("metadata");

    let languages = select_languages(&mut store, transport, opts, language)?;
    tracing::info!(languages = languages.len(), "parsing language pages");

    for lang in &languages {
        let outcome = scrape_language(&mut store, transport, retry, lang)?;
        summary.record(&lang.code, &outcome);
    }

    let pending: Vec<Recording> = store
        .recordings(language)?
        .into_iter()
        .filter(|r| r.kind == RecordingKind::WordList)
        .filter(|r| {
            matches!(
                r.wordlist_status,
                WordlistStatus::Pending | WordlistStatus::FetchFailed
            )
        })
        .collect();
    tracing::info!(recordings = pending.len(), "parsing word lists");

    for rec in &pending {
        let outcome = scrape_wordlist(&mut store, transport, retry, rec)?;
        store.set_wordlist_status(rec.id, outcome.status())?;
        tracing::debug!(recording = %rec.filename, outcome = outcome.label(), "word list done");
        summary.record(format!("{}/{}", rec.language_code, rec.filename), &outcome);
    }

    summary.log();
    Ok(summary)
}

/// [`run_metadata_with`] over a real HTTP session.
pub fn run_metadata(opts: &Opts, language: Option<&str>) -> Result<RunSummary> {
    let delay = Duration::from_secs_f64(opts.metadata.delay_secs);
    let mut client = HttpClient::new(&opts.http, delay)?;
    run_metadata_with(opts, language, &mut client)
}

/// All languages from a fresh index, or the one requested.
///
/// A requested code already in the store skips the index fetch.
fn select_languages<T: Transport + ?Sized>(
    store: &mut Store,
    transport: &mut T,
    opts: &Opts,
    language: Option<&str>,
) -> Result<Vec<Language>> {
    let Some(code) = language.map(language_code) else {
        scrape_index(store, transport, opts)?;
        return store.languages(None);
    };

    let known = store.languages(Some(&code))?;
    if !known.is_empty() {
        return Ok(known);
    }
    scrape_index(store, transport, opts)?;
    let found = store.languages(Some(&code))?;
    if found.is_empty() {
        return Err(Error::msg(format!("language {code} is not in the archive index")));
    }
    Ok(found)
}

fn scrape_index<T: Transport + ?Sized>(
    store: &mut Store,
    transport: &mut T,
    opts: &Opts,
) -> Result<()> {
    let url = &opts.metadata.index_url;
    let html = fetch_text(transport, url, &opts.download.retry)?;
    let languages = parse_index(&html, url);
    tracing::info!(languages = languages.len(), "index parsed");
    for lang in &languages {
        store.upsert_language(lang)?;
    }
    Ok(())
}

fn scrape_language<T: Transport + ?Sized>(
    store: &mut Store,
    transport: &mut T,
    retry: &RetryOpts,
    lang: &Language,
) -> Result<LanguageOutcome> {
    let html = match fetch_text(transport, &lang.url, retry) {
        Ok(html) => html,
        Err(err) => return Ok(LanguageOutcome::FetchFailed(err.to_string())),
    };
    let recordings = parse_language_page(&html, &lang.url);
    for desc in &recordings {
        store.upsert_recording(&lang.code, desc)?;
    }
    tracing::debug!(language = %lang.code, recordings = recordings.len(), "language page parsed");
    Ok(LanguageOutcome::Parsed {
        recordings: recordings.len(),
    })
}

fn scrape_wordlist<T: Transport + ?Sized>(
    store: &mut Store,
    transport: &mut T,
    retry: &RetryOpts,
    rec: &Recording,
) -> Result<WordlistOutcome> {
    let Some(url) = rec.wordlist_url.as_deref() else {
        return Ok(WordlistOutcome::NoEntries("no word-list page".into()));
    };

    let html = match fetch_text(transport, url, retry) {
        Ok(html) => html,
        // A page that does not exist will not appear on a retry.
        Err(err) if err.is_gone() => return Ok(WordlistOutcome::NoEntries(err.to_string())),
        Err(err) => return Ok(WordlistOutcome::FetchFailed(err.to_string())),
    };

    let table = match parse_wordlist(&html) {
        WordlistPage::Table(table) => table,
        WordlistPage::Empty(why) => {
            return Ok(WordlistOutcome::NoEntries(why.to_string()));
        }
    };

    let entries = assign_numbers(table.entries(), table.layout());
    if entries.is_empty() {
        return Ok(WordlistOutcome::NoEntries("table has no readable rows".into()));
    }
    let written = store.upsert_entries(rec.id, &entries)?;
    Ok(WordlistOutcome::Parsed {
        entries: written,
        layout: table.layout(),
    })
}
