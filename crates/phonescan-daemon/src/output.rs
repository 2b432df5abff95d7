//! Record output

use anyhow::Result;
use clap::ValueEnum;
use phonescan_core::PhoneRecord;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per phone, printed as found
    Text,
    /// A JSON array printed when the scan ends
    Json,
}

/// Writes phones in the chosen format
pub struct Printer<W: Write> {
    format: OutputFormat,
    out: W,
    phones: Vec<PhoneRecord>,
    count: usize,
}

impl<W: Write> Printer<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self {
            format,
            out,
            phones: Vec::new(),
            count: 0,
        }
    }

    pub fn phone(&mut self, phone: &PhoneRecord) -> Result<()> {
        self.count += 1;
        match self.format {
            OutputFormat::Text => {
                writeln!(
                    self.out,
                    "{}\t{}\t{}",
                    phone.ip_address(),
                    display_extension(phone.extension()),
                    phone
                )?;
                self.out.flush()?;
            }
            OutputFormat::Json => self.phones.push(phone.clone()),
        }
        Ok(())
    }

    /// Flush any buffered output, returning the number of phones written
    pub fn finish(mut self) -> Result<usize> {
        if self.format == OutputFormat::Json {
            serde_json::to_writer_pretty(&mut self.out, &self.phones)?;
            writeln!(self.out)?;
        }
        self.out.flush()?;
        Ok(self.count)
    }
}

fn display_extension(extension: &str) -> &str {
    if extension.is_empty() {
        "-"
    } else {
        extension
    }
}
