use anyhow::Result;
use assert_approx_eq::assert_approx_eq;
use dendro_algorithms::{parameters::FinParameters, pipeline::run};
use dendro_core::{
    containers::PointCloud,
    nalgebra::{Vector2, Vector3},
};
use dendro_io::{
    ascii::{AsciiReader, AsciiWriter},
    tabular::export_results,
};
use std::fs;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("dendro_io_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn stem(center: Vector2<f64>, radius: f64, height: f64) -> PointCloud {
    let spacing = 0.0125;
    let samples = (2.0 * std::f64::consts::PI * radius / spacing).ceil() as usize;
    let rings = (height / spacing).round() as usize;
    (0..=rings)
        .flat_map(|ring| {
            (0..samples).map(move |sample| {
                let angle = 2.0 * std::f64::consts::PI * sample as f64 / samples as f64;
                let position = Vector3::new(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                    ring as f64 * spacing,
                );
                (position, position.z)
            })
        })
        .collect()
}

#[test]
fn test_ascii_roundtrip() -> Result<()> {
    let dir = scratch_dir("ascii")?;
    let path = dir.join("cloud.txt");
    let cloud = vec![
        (Vector3::new(512_000.125, 4_650_000.5, 301.25), 1.25),
        (Vector3::new(512_001.0, 4_650_001.75, 300.0), 0.0),
    ]
    .into_iter()
    .collect::<PointCloud>();

    let mut writer = AsciiWriter::from_path(&path, "xyzh")?;
    writer.set_delimiter(" ");
    writer.write_cloud(&cloud)?;
    writer.flush()?;
    drop(writer);

    let read = AsciiReader::from_path(&path, "xyzh", " ")?.read_cloud()?;
    assert_eq!(read, cloud);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    let path = std::env::temp_dir().join("dendro_io_does_not_exist.txt");
    assert!(AsciiReader::from_path(path, "xyz", " ").is_err());
}

#[test]
fn test_export_results() -> Result<()> {
    let dir = scratch_dir("export")?;
    let cloud = stem(Vector2::new(3.0, 4.0), 0.15, 6.0);
    let output = run(&cloud, &FinParameters::default())?;
    let written = export_results(&dir, "plot", &cloud, &output)?;
    assert_eq!(written.len(), 12);
    assert!(written.iter().all(|path| path.exists()));

    let sections = fs::read_to_string(dir.join("plot_sections.txt"))?;
    assert_eq!(sections.lines().count(), 1);
    assert!(sections.starts_with("0.300 0.500 0.700"));

    let diameters = fs::read_to_string(dir.join("plot_diameters.txt"))?;
    assert_eq!(diameters.lines().count(), output.num_trees());

    let trees = fs::read_to_string(dir.join("plot_dbh_and_heights.txt"))?;
    let values = trees
        .lines()
        .next()
        .unwrap()
        .split(' ')
        .map(|value| value.parse::<f64>().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(values.len(), 4);
    assert_approx_eq!(values[0], 6.0, 0.1);
    assert_approx_eq!(values[1], 0.3, 0.005);
    assert_approx_eq!(values[2], 3.0, 0.01);
    assert_approx_eq!(values[3], 4.0, 0.01);

    let assigned = fs::read_to_string(dir.join("plot_assigned.txt"))?;
    assert_eq!(assigned.lines().count(), cloud.len());

    fs::remove_dir_all(&dir)?;
    Ok(())
}
