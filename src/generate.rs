use anyhow::{Context, Result};
use rand::Rng;
use tch::{Device, Kind};

use crate::{
    constants::PAD_CHAR,
    model::Vae,
    probability::{create_relative_probabilities, sample_index},
    tokenizer::{CharDictionary, pad_smile},
};

/// Samples new SMILES strings near a seed molecule from a trained model.
pub struct MoleculeGenerator<'a, M: Vae> {
    device: Device,
    model: &'a M,
    char_dict: &'a CharDictionary,
    seq_len: usize,
    batch_size: i64,
}

impl<'a, M: Vae> MoleculeGenerator<'a, M> {
    /// `batch_size` is the number of rows the model is fed; the seed is replicated across all
    /// of them.
    pub fn new(
        device: Device,
        model: &'a M,
        char_dict: &'a CharDictionary,
        seq_len: usize,
        batch_size: i64,
    ) -> Self {
        MoleculeGenerator {
            device,
            model,
            char_dict,
            seq_len,
            batch_size,
        }
    }

    /// Generates one string of exactly `seq_len` characters using the thread RNG.
    ///
    /// Fails if any position's repaired distribution does not sum to one (see
    /// [`create_relative_probabilities`]), which is common for a barely trained model.
    pub fn generate(&self, smile: &str) -> Result<String> {
        self.generate_with_rng(smile, &mut rand::thread_rng())
    }

    pub fn generate_with_rng<R: Rng + ?Sized>(&self, smile: &str, rng: &mut R) -> Result<String> {
        // Disable gradient tracking since we're not training now.
        let _no_grad_guard = tch::no_grad_guard();
        let one_hot = self.char_dict.one_hot_smile(&pad_smile(smile, self.seq_len)?)?;
        // [seq_len, alphabet] -> [batch, seq_len, alphabet], every row the same seed
        let batch = one_hot
            .unsqueeze(0)
            .repeat([self.batch_size, 1, 1])
            .to_device(self.device);
        let (reconstruction, _, _) = self.model.forward(&batch);
        // Only the first row is used.
        let distribution = reconstruction.get(0).to_kind(Kind::Double).to_device(Device::Cpu);

        let mut new_smile = String::with_capacity(self.seq_len);
        for position in 0..self.seq_len as i64 {
            let target = Vec::<f64>::try_from(&distribution.get(position))
                .context("couldn't read character distribution")?;
            let probabilities = create_relative_probabilities(&target);
            let index = sample_index(&probabilities, rng)
                .with_context(|| format!("sampling failed at position {}", position))?;
            new_smile.push(self.char_dict.decode(index)?);
        }
        Ok(new_smile)
    }
}

/// Returns `smile` up to its first padding character.
pub fn interpret_result(smile: &str) -> &str {
    match smile.find(PAD_CHAR) {
        Some(end) => &smile[..end],
        None => smile,
    }
}
