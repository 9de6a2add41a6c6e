/// nalgebra
/// https://docs.rs/nalgebra/latest/nalgebra/
///
/// ndarray
/// https://docs.rs/ndarray/latest/ndarray/all.html
///
/// opencv
/// https://docs.rs/opencv/latest/opencv/all.html
///
// grasps: <source_dir>/<object>/pregrasp/*.csv
extern crate opencv;

mod assembler;
mod config;
mod dataset;
mod error;
mod global_cast;
mod plot;
mod sampler;
mod simulator;
mod store;
mod subset; // 抓取子集
mod transform;
mod utility;
mod validator;

use std::path::PathBuf;

use anyhow::Context;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::assembler::DatasetAssembler;
use crate::config::RunConfig;
use crate::dataset::{CsvGraspDatabase, GraspSource};
use crate::simulator::{RemoteSimulator, SimSession};
use crate::store::StoreReader;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .init();

    let config_file = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("configs/collect.json"));
    log::info!("config: {:?}", config_file);
    let config = RunConfig::read_from_json(&config_file)
        .with_context(|| format!("failed to read config {}", config_file.display()))?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let database = CsvGraspDatabase::new(config.source_dir.clone());
    let keys = match &config.objects {
        Some(objects) => objects.clone(),
        None => database
            .object_keys()
            .with_context(|| format!("failed to list {}", config.source_dir.display()))?,
    };
    log::info!("objects: {}", keys.len());
    let batch = subset::load_subset(&database, &keys, config.shuffle_data, &mut rng)
        .context("failed to load grasps")?;
    batch
        .check_layout(&config.grasp_layout)
        .context("grasp descriptors do not match grasp_layout")?;

    let sim = RemoteSimulator::connect(&config.spawn).with_context(|| {
        format!("failed to connect to {}:{}", config.spawn.ip, config.spawn.port)
    })?;
    let mut session = SimSession::open(sim);

    let assembler = DatasetAssembler::from_config(&config);
    let manifest = assembler
        .create_dataset(&mut session, &batch, &config.dataset_path, &mut rng)
        .with_context(|| format!("failed to create {}", config.dataset_path.display()))?;
    session.close().context("failed to close simulator")?;

    let reader = StoreReader::open(&config.dataset_path)
        .with_context(|| format!("failed to reopen {}", config.dataset_path.display()))?;
    if !reader.manifest.complete || reader.manifest.rows != manifest.rows {
        anyhow::bail!("dataset {} was not finalized", config.dataset_path.display());
    }

    log::info!(
        "wrote {} rows to {}, {} records skipped",
        manifest.rows,
        config.dataset_path.display(),
        manifest.skipped_records.len()
    );
    Ok(())
}
