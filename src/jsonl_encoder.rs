use std::io::Write;

use crate::Result;
use crate::exporter::ManifestRecord;
use crate::record_encoder::RecordEncoder;

/// A `RecordEncoder` that writes one JSON object per line.
///
/// Unlike [`crate::json_array_encoder::JsonArrayEncoder`] there is no framing,
/// so an empty manifest is an empty file and a truncated one is still valid
/// up to its last complete line.
pub struct JsonlEncoder<W: Write> {
    w: W,
    closed: bool,
}

impl<W: Write> JsonlEncoder<W> {
    pub fn new(w: W) -> Self {
        Self { w, closed: false }
    }
}

impl<W: Write> RecordEncoder for JsonlEncoder<W> {
    fn write_record(&mut self, record: &ManifestRecord<'_>) -> Result<()> {
        if self.closed {
            return Err(crate::Error::msg(
                "cannot write record: encoder is already closed",
            ));
        }
        serde_json::to_writer(&mut self.w, record)?;
        self.w.write_all(b"\n")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.w.flush()?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::tests::record;

    #[test]
    fn jsonl_close_without_records_emits_nothing() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = JsonlEncoder::new(&mut out);
        enc.close()?;
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn jsonl_writes_one_object_per_line() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = JsonlEncoder::new(&mut out);
        enc.write_record(&record(1, "pa"))?;
        enc.write_record(&record(2, "ta"))?;
        enc.close()?;

        let s = std::str::from_utf8(&out)?;
        let lines: Vec<serde_json::Value> = s
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["ipa"], "pa");
        assert_eq!(lines[1]["entry_number"], 2);
        assert!(s.ends_with('\n'));
        Ok(())
    }

    #[test]
    fn jsonl_write_after_close_errors() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = JsonlEncoder::new(&mut out);
        enc.close()?;
        let err = enc.write_record(&record(1, "pa")).unwrap_err();
        assert!(err.to_string().contains("already closed"));
        Ok(())
    }
}
