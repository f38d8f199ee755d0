use std::collections::HashSet;

use super::ParsedEntry;
use crate::records::{ColumnLayout, NewEntry};

/// Settle entry numbers for a parsed table.
///
/// Explicit numbers are kept the first time they appear. A row without a
/// number, or repeating one already used, takes the smallest number above
/// the previous row's that no explicit row claims and nothing has used yet.
/// The result depends only on row order, so identical HTML always yields
/// identical numbering.
pub fn assign_numbers(
    entries: impl IntoIterator<Item = ParsedEntry>,
    layout: ColumnLayout,
) -> Vec<NewEntry> {
    let entries: Vec<ParsedEntry> = entries.into_iter().collect();
    let explicit: HashSet<u32> = entries.iter().filter_map(|e| e.entry_number).collect();
    let mut used = HashSet::with_capacity(entries.len());
    let mut previous = 0u32;

    entries
        .into_iter()
        .enumerate()
        .map(|(position, e)| {
            let number = match e.entry_number {
                Some(n) if used.insert(n) => n,
                _ => {
                    let mut candidate = previous.saturating_add(1);
                    while (used.contains(&candidate) || explicit.contains(&candidate))
                        && candidate < u32::MAX
                    {
                        candidate += 1;
                    }
                    used.insert(candidate);
                    candidate
                }
            };
            previous = number;
            NewEntry {
                entry_number: number,
                position: u32::try_from(position).unwrap_or(u32::MAX),
                ipa: e.ipa,
                gloss: e.gloss,
                orthography: e.orthography,
                sound: e.sound,
                layout,
            }
        })
        .collect()
}
