use anyhow::{bail, Result};

/// Meaning of one column of an ASCII point cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Skip,
    CoordinateX,
    CoordinateY,
    CoordinateZ,
    NormalizedHeight,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ColumnType {
    pub fn literal(&self) -> char {
        match self {
            ColumnType::Skip => 's',
            ColumnType::CoordinateX => 'x',
            ColumnType::CoordinateY => 'y',
            ColumnType::CoordinateZ => 'z',
            ColumnType::NormalizedHeight => 'h',
        }
    }
}

//s - skip this column
//x - x coordinate
//y - y coordinate
//z - z coordinate
//h - height above ground
/// Parses a format string such as `"xyzh"` into the type of every column.
///
/// The coordinates `x`, `y` and `z` have to appear exactly once, `h` at most once.
pub fn parse_format(format: &str) -> Result<Vec<ColumnType>> {
    let mut columns = Vec::<ColumnType>::new();
    for character in format.chars() {
        let column = match character {
            's' => ColumnType::Skip,
            'x' => ColumnType::CoordinateX,
            'y' => ColumnType::CoordinateY,
            'z' => ColumnType::CoordinateZ,
            'h' => ColumnType::NormalizedHeight,
            _ => {
                bail!(
                    "FormatError can't interpret format literal '{}' in format string '{}'.",
                    character,
                    format
                );
            }
        };
        if column != ColumnType::Skip && columns.contains(&column) {
            bail!(
                "FormatError format literal '{}' appears more than once in format string '{}'.",
                character,
                format
            );
        }
        columns.push(column);
    }
    for required in [
        ColumnType::CoordinateX,
        ColumnType::CoordinateY,
        ColumnType::CoordinateZ,
    ]
    .iter()
    {
        if !columns.contains(required) {
            bail!(
                "FormatError format string '{}' lacks the literal '{}'.",
                format,
                required.literal()
            );
        }
    }
    Ok(columns)
}
