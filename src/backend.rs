use std::path::Path;

use crate::Result;
use crate::grid::GridParams;
use crate::records::SegmentMethod;
use crate::silence::Span;

/// Pluggable silence-segmentation backend used by [`crate::segmenter`].
///
/// A backend loads one recording once, answers any number of detection
/// queries against it during the grid search, and then cuts clips out of it.
/// Implementations must be shareable across pool workers.
pub trait SegmentBackend: Sync {
    /// Loaded recording state (decoded samples, a probed duration, ...).
    type Audio;

    /// Stored with every segment and attempt this backend produces.
    fn method(&self) -> SegmentMethod;

    fn load(&self, path: &Path) -> Result<Self::Audio>;

    fn duration_ms(&self, audio: &Self::Audio) -> u64;

    /// Non-silent spans for one grid combination, in time order.
    fn detect(&self, audio: &Self::Audio, params: &GridParams) -> Result<Vec<Span>>;

    /// Write `span` of the recording to `dest` as a mono WAV clip.
    fn extract(&self, audio: &Self::Audio, span: Span, dest: &Path) -> Result<()>;
}
