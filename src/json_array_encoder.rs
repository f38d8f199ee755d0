use std::io::Write;

use crate::Result;
use crate::exporter::ManifestRecord;
use crate::record_encoder::RecordEncoder;

/// A `RecordEncoder` that writes the manifest as a single JSON array.
///
/// Records are streamed straight into the writer, one per line, so a large
/// corpus is never held in memory as a `serde_json::Value`.
///
/// Example output:
/// ```json
/// [
/// {"id":"abq_abq_word-list_1992_01_001","entry_number":1,"ipa":"a","fallback":false,...},
/// {"id":"abq_abq_word-list_1992_01_002","entry_number":2,"ipa":"ba","fallback":true,...}
/// ]
/// ```
pub struct JsonArrayEncoder<W: Write> {
    w: W,

    /// Whether the opening `[` has been written.
    started: bool,

    /// Whether the next element is the first, so no comma precedes it.
    first: bool,

    /// Once closed, no further writes are allowed.
    closed: bool,
}

impl<W: Write> JsonArrayEncoder<W> {
    pub fn new(w: W) -> Self {
        Self {
            w,
            started: false,
            first: true,
            closed: false,
        }
    }

    /// Deferred so an empty manifest is still `[]`.
    fn start_if_needed(&mut self) -> Result<()> {
        if !self.started {
            self.w.write_all(b"[")?;
            self.started = true;
        }
        Ok(())
    }
}

impl<W: Write> RecordEncoder for JsonArrayEncoder<W> {
    fn write_record(&mut self, record: &ManifestRecord<'_>) -> Result<()> {
        if self.closed {
            return Err(crate::Error::msg(
                "cannot write record: encoder is already closed",
            ));
        }

        self.start_if_needed()?;

        if !self.first {
            self.w.write_all(b",")?;
        }
        self.first = false;

        self.w.write_all(b"\n")?;
        serde_json::to_writer(&mut self.w, record)?;
        Ok(())
    }

    /// Close the array and flush. Calling this twice is safe.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.start_if_needed()?;
        if !self.first {
            self.w.write_all(b"\n")?;
        }
        self.w.write_all(b"]\n")?;
        self.w.flush()?;

        self.closed = true;
        Ok(())
    }
}
