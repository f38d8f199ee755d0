use crate::Result;
use crate::exporter::ManifestRecord;

/// Streams manifest records into some output format.
pub trait RecordEncoder {
    fn write_record(&mut self, record: &ManifestRecord<'_>) -> Result<()>;

    /// Finish the output. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}
