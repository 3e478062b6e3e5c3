use std::path::Path;

use anyhow::Result;
use tch::{Device, nn::VarStore};

mod constants;
mod dataset;
mod generate;
mod model;
mod plot;
mod probability;
mod tokenizer;
mod train;

use constants::{
    ALPHABET_SIZE, BATCH_SIZE, DATA_FILE, DICT_NAME, MAX_SMILE_LENGTH, SEED_SMILES, TEST_NAME, TRAIN_NAME,
};
use dataset::MolDataSet;
use generate::{MoleculeGenerator, interpret_result};
use model::{MolVae, VaeConfig};
use plot::TerminalPlot;
use train::{LearningRate, VaeTrainer};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    // Kludge to load CUDA since libtorch seems to load it lazily, causing is_available to return false.
    unsafe {
        libc::dlopen(
            c"/usr/local/lib/libtorch/lib/libtorch_cuda.so".as_ptr(),
            libc::RTLD_LAZY,
        );
    }
    let device = Device::cuda_if_available();
    log::info!("Using device {:?}", device);

    let data = MolDataSet::load(
        Path::new(DATA_FILE),
        TRAIN_NAME,
        TEST_NAME,
        DICT_NAME,
        MAX_SMILE_LENGTH,
        ALPHABET_SIZE,
    )?;

    log::info!("Making model...");
    let var_store = VarStore::new(device);
    let config = VaeConfig::default();
    let model = MolVae::new(&var_store.root(), config);
    let mut trainer = VaeTrainer::new(var_store, model)?;

    log::info!("Training...");
    let report = trainer.train(data.train(), BATCH_SIZE, &mut TerminalPlot::stdout())?;
    let low_rate_batches = report
        .rates
        .iter()
        .filter(|rate| **rate == LearningRate::Low)
        .count();
    log::info!(
        "Trained {} batches ({} at the low learning rate), total loss {}",
        report.trace.len(),
        low_rate_batches,
        report.total_loss
    );
    let test_loss = trainer.evaluate(data.test(), BATCH_SIZE)?;
    log::info!("Mean test loss: {}", test_loss);

    log::info!("Generating similar molecules...");
    let generator = MoleculeGenerator::new(
        device,
        trainer.model(),
        data.char_dict(),
        trainer.model().config().seq_len as usize,
        BATCH_SIZE,
    );
    // Any position whose repaired distribution misses 1 aborts the run here.
    for seed in SEED_SMILES {
        let new_mol = generator.generate(seed)?;
        println!("New Molecule: {}", interpret_result(&new_mol));
    }
    Ok(())
}
