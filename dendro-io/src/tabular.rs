use anyhow::{Context, Result};
use dendro_algorithms::pipeline::FinOutput;
use dendro_core::{containers::PointCloud, nalgebra::DMatrix};
use itertools::Itertools;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Tree id written for points that belong to no tree
pub const UNASSIGNED_TREE: i64 = -1;
/// Axis distance written for points that belong to no tree
pub const UNASSIGNED_DISTANCE: f64 = 100_000.0;

/// Writes every row of `rows` as one line of space separated values with three decimals
pub fn write_rows<W, I, R>(writer: &mut W, rows: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = f64>,
{
    for row in rows {
        let line = row.into_iter().map(|value| format!("{:.3}", value)).join(" ");
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}

pub fn write_matrix<W: Write>(writer: &mut W, matrix: &DMatrix<f64>) -> Result<()> {
    write_rows(
        writer,
        matrix
            .row_iter()
            .map(|row| row.iter().copied().collect::<Vec<_>>()),
    )
}

fn write_file<I, R>(path: &Path, rows: I) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = f64>,
{
    let file =
        File::create(path).with_context(|| format!("Could not create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_rows(&mut writer, rows).with_context(|| format!("Could not write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Writes all results of a run into `directory`, every file named `<basename>_<content>.txt`.
///
/// Matrices have one row per tree and one column per section. Unknown heights and diameters are
/// written as 0, unassigned points get the tree id [UNASSIGNED_TREE] and the distance
/// [UNASSIGNED_DISTANCE]. Returns the paths of all written files.
pub fn export_results(
    directory: &Path,
    basename: &str,
    cloud: &PointCloud,
    output: &FinOutput,
) -> Result<Vec<PathBuf>> {
    let path = |content: &str| directory.join(format!("{}_{}.txt", basename, content));
    let sections = &output.sections;
    let as_f64 = |matrix: DMatrix<usize>| matrix.map(|value| value as f64);

    let matrices = vec![
        ("diameters", sections.radius().map(|radius| 2.0 * radius)),
        ("X_c", sections.center_x()),
        ("Y_c", sections.center_y()),
        ("check_circle", sections.review().map(f64::from)),
        ("n_points_in", as_f64(sections.inner_points())),
        ("sector_perct", sections.sector_percentage()),
        ("outliers", output.outlier_probability.clone()),
        (
            "quality",
            output.quality.map(|good| if good { 1.0 } else { 0.0 }),
        ),
    ];

    let mut written = vec![];
    for (content, matrix) in matrices {
        let file_path = path(content);
        write_file(
            &file_path,
            matrix
                .row_iter()
                .map(|row| row.iter().copied().collect::<Vec<_>>()),
        )?;
        written.push(file_path);
    }

    let file_path = path("sections");
    write_file(&file_path, std::iter::once(sections.sections.clone()))?;
    written.push(file_path);

    let records = output.tree_records();
    let file_path = path("dbh_and_heights");
    write_file(
        &file_path,
        records.iter().map(|record| {
            vec![
                record.height.unwrap_or(0.0),
                record.dbh.unwrap_or(0.0),
                record.location.x,
                record.location.y,
            ]
        }),
    )?;
    written.push(file_path);

    let file_path = path("tree_locator");
    write_file(
        &file_path,
        records.iter().map(|record| {
            vec![record.location.x, record.location.y, record.location.z]
        }),
    )?;
    written.push(file_path);

    let file_path = path("assigned");
    write_file(
        &file_path,
        cloud
            .iter()
            .zip(output.point_assignments.iter())
            .map(|((position, height), assignment)| {
                let (tree, distance) = match assignment {
                    Some(assignment) => (
                        output.axes[assignment.tree].tree_id as i64,
                        assignment.distance,
                    ),
                    None => (UNASSIGNED_TREE, UNASSIGNED_DISTANCE),
                };
                vec![
                    position.x,
                    position.y,
                    position.z,
                    height,
                    tree as f64,
                    distance,
                ]
            }),
    )?;
    written.push(file_path);

    info!(
        "Wrote {} result files to {}",
        written.len(),
        directory.display()
    );
    Ok(written)
}
