use crate::trace::NamedTrace;
use anyhow::Result;
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct TraceRow<'a> {
    series: &'a str,
    time: f64,
    index: usize,
    value: f64,
}

/// Writes traces as long-format CSV: `series,time,index,value`.
pub struct TraceLogger<W: Write> {
    writer: Writer<W>,
}

impl TraceLogger<File> {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }
}

impl<W: Write> TraceLogger<W> {
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: Writer::from_writer(inner),
        }
    }

    pub fn log(&mut self, trace: &NamedTrace) -> Result<()> {
        for (time, sample) in trace.trace.export() {
            for (index, &value) in sample.values().iter().enumerate() {
                self.writer.serialize(TraceRow {
                    series: &trace.series,
                    time: *time,
                    index,
                    value,
                })?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_batch(&mut self, traces: &[NamedTrace]) -> Result<()> {
        for trace in traces {
            self.log(trace)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flushing trace csv: {}", e.error()))
    }
}
