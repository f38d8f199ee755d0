use serde::Deserialize;

/// The supported encodings for the exported manifest.
///
/// - `ValueEnum` (behind the `cli` feature) lets the binary take this directly as a flag.
/// - Each variant maps to a concrete `RecordEncoder` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    /// One JSON array holding every record.
    #[default]
    Json,

    /// One JSON object per line.
    Jsonl,
}

impl ManifestFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
        }
    }
}
