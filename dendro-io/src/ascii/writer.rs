use anyhow::{Context, Result};
use dendro_core::containers::PointCloud;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{parse_format, ColumnType};

/// Writes point clouds as delimited ASCII, one point per line.
///
/// Skipped columns are written as `0`. Trailing zeros of the decimals are removed.
pub struct AsciiWriter<W: Write> {
    writer: W,
    delimiter: String,
    precision: usize,
    columns: Vec<ColumnType>,
}

impl<W: Write> AsciiWriter<W> {
    pub fn from_write(write: W, format: &str) -> Result<Self> {
        Ok(Self {
            writer: write,
            delimiter: String::from(", "),
            precision: 5,
            columns: parse_format(format)?,
        })
    }

    pub fn set_delimiter(&mut self, delimiter: &str) {
        self.delimiter = String::from(delimiter);
    }

    pub fn set_precision(&mut self, precision: usize) {
        self.precision = precision;
    }

    pub fn write_cloud(&mut self, cloud: &PointCloud) -> Result<()> {
        for (position, height) in cloud.iter() {
            for (index, column) in self.columns.iter().enumerate() {
                if index > 0 {
                    self.writer.write_all(self.delimiter.as_bytes())?;
                }
                let value = match column {
                    ColumnType::Skip => {
                        self.writer.write_all(b"0")?;
                        continue;
                    }
                    ColumnType::CoordinateX => position.x,
                    ColumnType::CoordinateY => position.y,
                    ColumnType::CoordinateZ => position.z,
                    ColumnType::NormalizedHeight => height,
                };
                let formatted = format!("{:.1$}", value, self.precision);
                self.writer
                    .write_all(trim_unnecessary_trailing_zeros(&formatted).as_bytes())?;
            }
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl AsciiWriter<BufWriter<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, format: &str) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Could not create {}", path.as_ref().display()))?;
        Self::from_write(BufWriter::new(file), format)
    }
}

fn trim_unnecessary_trailing_zeros(value: &str) -> &str {
    if !value.contains('.') {
        return value;
    }
    let mut end = value.len();
    while value[..end].ends_with('0') && !value[..end].ends_with(".0") {
        end -= 1;
    }
    &value[..end]
}
