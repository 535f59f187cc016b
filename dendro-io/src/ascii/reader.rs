use anyhow::{bail, Context, Result};
use dendro_core::{containers::PointCloud, nalgebra::Vector3};
use itertools::{EitherOrBoth::*, Itertools};
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use super::{parse_format, ColumnType};

/// Reads delimited ASCII point clouds.
///
/// The columns are described by a format string, see [parse_format]. Empty lines and lines starting with
/// `#` are ignored, as are trailing columns not covered by the format. If the format has no `h` column, the
/// cloud is assumed to be normalized already and every `z` is used as the height above ground.
pub struct AsciiReader<R: BufRead> {
    reader: R,
    delimiter: String,
    columns: Vec<ColumnType>,
}

impl<R: BufRead> AsciiReader<R> {
    pub fn from_read(read: R, format: &str, delimiter: &str) -> Result<Self> {
        if delimiter.is_empty() {
            bail!("The delimiter must not be empty");
        }
        Ok(Self {
            reader: read,
            delimiter: delimiter.to_string(),
            columns: parse_format(format)?,
        })
    }

    pub fn read_cloud(self) -> Result<PointCloud> {
        let has_heights = self.columns.contains(&ColumnType::NormalizedHeight);
        if !has_heights {
            info!("No height column given, using z as the height above ground");
        }
        let mut cloud = PointCloud::new();
        for (index, line) in self.reader.lines().enumerate() {
            let line = line.with_context(|| format!("ReadError in line {}.", index + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (position, height) = parse_line(trimmed, &self.delimiter, &self.columns)
                .with_context(|| format!("ReadError in line {}.", index + 1))?;
            cloud.push(position, height.unwrap_or(position.z));
        }
        Ok(cloud)
    }
}

impl AsciiReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, format: &str, delimiter: &str) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Could not open {}", path.as_ref().display()))?;
        Self::from_read(BufReader::new(file), format, delimiter)
    }
}

fn parse_line(
    line: &str,
    delimiter: &str,
    columns: &[ColumnType],
) -> Result<(Vector3<f64>, Option<f64>)> {
    let values: Box<dyn Iterator<Item = &str> + '_> = if delimiter.trim().is_empty() {
        Box::new(line.split_whitespace())
    } else {
        Box::new(line.split(delimiter).map(str::trim))
    };

    let mut position = Vector3::zeros();
    let mut height = None;
    for pair in values.zip_longest(columns) {
        match pair {
            Both(value_str, column) => match column {
                ColumnType::CoordinateX => position.x = parse_value(value_str, *column)?,
                ColumnType::CoordinateY => position.y = parse_value(value_str, *column)?,
                ColumnType::CoordinateZ => position.z = parse_value(value_str, *column)?,
                ColumnType::NormalizedHeight => height = Some(parse_value(value_str, *column)?),
                ColumnType::Skip => {}
            },
            Left(_) => continue,
            Right(_) => {
                bail!("Input format string expected more items in the line. Found End-of-Line.")
            }
        }
    }
    Ok((position, height))
}

fn parse_value<V: FromStr>(value_str: &str, column: ColumnType) -> Result<V> {
    value_str.parse::<V>().map_err(|_| {
        anyhow::anyhow!(
            "ParseError at parsing {} for format literal '{}': found '{}'.",
            column,
            column.literal(),
            value_str
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const POINTS: &str = "1.0, 2.0, 3.0, 0.5, 7\n\n# comment\n4.0, 5.0, 6.0, 1.5, 8\n";

    #[test]
    fn test_read_with_heights() -> Result<()> {
        let reader = AsciiReader::from_read(Cursor::new(POINTS), "xyzhs", ", ")?;
        let cloud = reader.read_cloud()?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(*cloud.position(1), Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(cloud.normalized_height(0), 0.5);
        Ok(())
    }

    #[test]
    fn test_read_without_heights_uses_z() -> Result<()> {
        let reader = AsciiReader::from_read(Cursor::new(POINTS), "xyz", ",")?;
        let cloud = reader.read_cloud()?;
        assert_eq!(cloud.normalized_heights(), &[3.0, 6.0]);
        Ok(())
    }

    #[test]
    fn test_read_whitespace_delimited() -> Result<()> {
        let reader = AsciiReader::from_read(Cursor::new("1  2\t3 0.25\n"), "xyzh", " ")?;
        let cloud = reader.read_cloud()?;
        assert_eq!(*cloud.position(0), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(cloud.normalized_height(0), 0.25);
        Ok(())
    }

    #[test]
    fn test_read_errors() {
        let too_short = AsciiReader::from_read(Cursor::new("1.0, 2.0\n"), "xyz", ", ")
            .and_then(|reader| reader.read_cloud());
        assert!(too_short.is_err());

        let not_a_number = AsciiReader::from_read(Cursor::new("1.0, a, 3.0\n"), "xyz", ", ")
            .and_then(|reader| reader.read_cloud());
        assert!(not_a_number.is_err());

        assert!(AsciiReader::from_read(Cursor::new(""), "xyz", "").is_err());
    }
}
