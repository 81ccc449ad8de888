//! Rendering of scan results.

use crate::accounting::{ScanTotals, SlackRecord};
use crate::config::OutputFormat;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One line of JSON output.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ReportLine<'a> {
    Inode(&'a SlackRecord),
    Summary {
        name: &'a str,
        #[serde(flatten)]
        totals: &'a ScanTotals,
    },
}

/// Writes per-inode lines and per-target summaries.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
    verbose: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat, verbose: bool) -> Self {
        Self {
            out,
            format,
            verbose,
        }
    }

    /// Announce a volume scan. Text format only.
    pub fn scan_started(&mut self, device: &str) -> Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(self.out, "Scanning device: {}...", device)?;
        }
        Ok(())
    }

    /// Write one inode line. Does nothing unless verbose.
    pub fn record(&mut self, record: &SlackRecord) -> Result<()> {
        if !self.verbose {
            return Ok(());
        }

        match self.format {
            OutputFormat::Text => {
                let label = match &record.path {
                    Some(path) => format!("{}:{}", record.ino, path.display()),
                    None => record.ino.to_string(),
                };
                writeln!(
                    self.out,
                    "[{}] ({} blocks) ({} bytes) (slack {}) (block size {})",
                    label, record.blocks, record.size, record.slack, record.block_size
                )?;
            }
            OutputFormat::Json => self.write_json(&ReportLine::Inode(record))?,
        }
        Ok(())
    }

    /// Write the summary of one scan target.
    pub fn summary(&mut self, name: &str, totals: &ScanTotals) -> Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(
                self.out,
                "{}: {} inodes, {} blocks, {} bytes, {} slack bytes",
                name, totals.inodes, totals.blocks, totals.bytes, totals.slack
            )?,
            OutputFormat::Json => self.write_json(&ReportLine::Summary { name, totals })?,
        }
        Ok(())
    }

    fn write_json(&mut self, line: &ReportLine<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, line)?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
