//! Adaptive parameter search for silence segmentation.
//!
//! Every `(threshold, min_silence)` pair is tried in a fixed order,
//! thresholds in the outer loop. A combination replaces the current best
//! only when it is strictly closer to the expected span count, so ties keep
//! the earliest. The search stops as soon as the best is within tolerance.

use std::ops::ControlFlow;

use crate::silence::Span;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    pub threshold_db: f64,
    pub min_silence_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridResult {
    pub spans: Vec<Span>,
    pub params: GridParams,
    /// `|spans - expected|` of the chosen combination.
    pub distance: u32,
    /// Combinations tried, including the chosen one.
    pub evaluated: u32,
}

/// The grid in evaluation order.
pub fn grid(thresholds_db: &[f64], min_silence_ms: &[u32]) -> Vec<GridParams> {
    thresholds_db
        .iter()
        .flat_map(|&threshold_db| {
            min_silence_ms.iter().map(move |&min_silence_ms| GridParams {
                threshold_db,
                min_silence_ms,
            })
        })
        .collect()
}

/// Run `detect` over `params` until a result lands within `tolerance` of `expected`.
///
/// Returns `Ok(None)` only for an empty grid. The first error from `detect`
/// aborts the search.
pub fn search_grid<E>(
    params: &[GridParams],
    expected: u32,
    tolerance: u32,
    mut detect: impl FnMut(&GridParams) -> Result<Vec<Span>, E>,
) -> Result<Option<GridResult>, E> {
    let step = params
        .iter()
        .try_fold(None::<GridResult>, |best, p| {
            let spans = match detect(p) {
                Ok(spans) => spans,
                Err(e) => return ControlFlow::Break(Err(e)),
            };
            let distance = distance(spans.len(), expected);
            let evaluated = best.as_ref().map_or(0, |b| b.evaluated) + 1;

            let mut best = match best {
                Some(b) if b.distance <= distance => b,
                _ => GridResult {
                    spans,
                    params: *p,
                    distance,
                    evaluated,
                },
            };
            best.evaluated = evaluated;

            if best.distance <= tolerance {
                ControlFlow::Break(Ok(best))
            } else {
                ControlFlow::Continue(Some(best))
            }
        });

    match step {
        ControlFlow::Continue(best) => Ok(best),
        ControlFlow::Break(found) => found.map(Some),
    }
}

fn distance(found: usize, expected: u32) -> u32 {
    let found = u32::try_from(found).unwrap_or(u32::MAX);
    found.abs_diff(expected)
}
