use crate::metrics::RequestSample;
use anyhow::Context;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Writes raw per-request records as JSON lines for offline comparison
/// across runs.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> anyhow::Result<JsonLinesSink> {
        let file = File::create(path)
            .context(format!("Failed to create output sink {}", path.display()))?;
        Ok(JsonLinesSink {
            writer: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, sample: &RequestSample) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, sample)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
