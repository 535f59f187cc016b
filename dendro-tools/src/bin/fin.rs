use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{App, Arg};
use dendro_algorithms::{
    normalization::normalize_cloud, parameters::FinParameters, pipeline::run,
};
use dendro_io::{ascii::AsciiReader, tabular::export_results};
use log::info;

struct Args {
    pub input_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub format: String,
    pub delimiter: String,
    pub config_file: Option<PathBuf>,
    pub write_config: Option<PathBuf>,
    pub normalize: bool,
}

fn get_args() -> Result<Args> {
    let matches = App::new("dendro fin")
        .version("0.1")
        .about("Detects trees in a forest point cloud and measures their diameter at breast height and height")
        .arg(
            Arg::with_name("INPUT")
                .short("i")
                .long("input")
                .takes_value(true)
                .value_name("INPUT")
                .help("Input point cloud as delimited ASCII file")
                .required_unless("WRITE_CONFIG"),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("DIR")
                .help("Directory for the result files. Defaults to the directory of the input file"),
        )
        .arg(
            Arg::with_name("FORMAT")
                .short("f")
                .long("format")
                .takes_value(true)
                .default_value("xyzh")
                .help("Columns of the input file: x, y, z, h (height above ground) or s (skip)"),
        )
        .arg(
            Arg::with_name("DELIMITER")
                .short("d")
                .long("delimiter")
                .takes_value(true)
                .default_value(" ")
                .help("Column delimiter of the input file"),
        )
        .arg(
            Arg::with_name("NORMALIZE")
                .short("n")
                .long("normalize")
                .help("Computes the height above ground from a terrain model of the scan instead of reading it"),
        )
        .arg(
            Arg::with_name("CONFIG")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("JSON")
                .help("Parameter file, missing values fall back to the defaults"),
        )
        .arg(
            Arg::with_name("WRITE_CONFIG")
                .long("write-config")
                .takes_value(true)
                .value_name("JSON")
                .help("Writes the default parameters to the given file and exits"),
        )
        .get_matches();

    Ok(Args {
        input_file: matches.value_of("INPUT").map(PathBuf::from),
        output_dir: matches.value_of("OUTPUT").map(PathBuf::from),
        format: matches.value_of("FORMAT").unwrap_or("xyzh").to_string(),
        delimiter: matches.value_of("DELIMITER").unwrap_or(" ").to_string(),
        config_file: matches.value_of("CONFIG").map(PathBuf::from),
        write_config: matches.value_of("WRITE_CONFIG").map(PathBuf::from),
        normalize: matches.is_present("NORMALIZE"),
    })
}

fn load_parameters(config_file: Option<&Path>) -> Result<FinParameters> {
    let params = match config_file {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Could not open parameter file {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Invalid parameter file {}", path.display()))?
        }
        None => FinParameters::default(),
    };
    params.validate()?;
    Ok(params)
}

fn write_default_parameters(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Could not create parameter file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &FinParameters::default())?;
    info!("Wrote default parameters to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = get_args()?;
    if let Some(path) = &args.write_config {
        return write_default_parameters(path);
    }
    let input_file = args
        .input_file
        .as_ref()
        .context("No input file given")?;
    let params = load_parameters(args.config_file.as_deref())?;

    let timer = Instant::now();
    let cloud = AsciiReader::from_path(input_file, &args.format, &args.delimiter)?.read_cloud()?;
    info!(
        "Read {} points from {} in {:.2}s",
        cloud.len(),
        input_file.display(),
        timer.elapsed().as_secs_f64()
    );

    let cloud = if args.normalize {
        let timer = Instant::now();
        let normalized = normalize_cloud(cloud.positions().to_vec(), &params.ground())?;
        info!(
            "Normalized the heights in {:.2}s",
            timer.elapsed().as_secs_f64()
        );
        normalized
    } else {
        cloud
    };

    let timer = Instant::now();
    let output = run(&cloud, &params)?;
    info!(
        "Found {} trees in {:.2}s",
        output.num_trees(),
        timer.elapsed().as_secs_f64()
    );

    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => input_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let basename = input_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("fin"));
    export_results(&output_dir, &basename, &cloud, &output)?;

    for record in output.tree_records() {
        println!(
            "tree {}: dbh {} height {} at ({:.3}, {:.3})",
            record.tree_id,
            record
                .dbh
                .map(|dbh| format!("{:.3}", dbh))
                .unwrap_or_else(|| String::from("-")),
            record
                .height
                .map(|height| format!("{:.2}", height))
                .unwrap_or_else(|| String::from("-")),
            record.location.x,
            record.location.y
        );
    }

    Ok(())
}
