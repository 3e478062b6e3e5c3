use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tch::{Kind, Tensor};

use crate::tokenizer::CharDictionary;

/// One-hot SMILES tensors and the dictionary they were encoded with.
#[derive(Debug)]
pub struct MolDataSet {
    train: Tensor,
    test: Tensor,
    char_dict: CharDictionary,
}

impl MolDataSet {
    /// Loads the three named arrays from a safetensors container and checks their shapes
    /// against the expected sequence length and alphabet size.
    pub fn load(
        path: &Path,
        train_name: &str,
        test_name: &str,
        dict_name: &str,
        seq_len: i64,
        alphabet_size: i64,
    ) -> Result<Self> {
        let named = Tensor::read_safetensors(path)
            .with_context(|| format!("failed to read dataset {}", path.display()))?;
        let take = |name: &str| -> Result<Tensor> {
            named
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, tensor)| tensor.shallow_clone())
                .ok_or_else(|| anyhow!("dataset {} has no array named {:?}", path.display(), name))
        };
        let train = take(train_name)?.to_kind(Kind::Float);
        let test = take(test_name)?.to_kind(Kind::Float);
        let dict = take(dict_name)?.to_kind(Kind::Uint8);

        let dict_bytes = Vec::<u8>::try_from(&dict.flatten(0, -1))
            .context("dictionary array is not byte-encoded")?;
        let char_dict = CharDictionary::from_bytes(&dict_bytes)?;
        if char_dict.len() as i64 != alphabet_size {
            bail!(
                "dictionary has {} entries, expected {}",
                char_dict.len(),
                alphabet_size
            );
        }
        for (name, tensor) in [(train_name, &train), (test_name, &test)] {
            let size = tensor.size();
            if size.len() != 3 || size[1] != seq_len || size[2] != alphabet_size {
                bail!(
                    "array {:?} has shape {:?}, expected [N, {}, {}]",
                    name,
                    size,
                    seq_len,
                    alphabet_size
                );
            }
        }
        log::info!(
            "Loaded {} training and {} test molecules from {}",
            train.size()[0],
            test.size()[0],
            path.display()
        );
        Ok(MolDataSet {
            train,
            test,
            char_dict,
        })
    }

    pub fn train(&self) -> &Tensor {
        &self.train
    }

    pub fn test(&self) -> &Tensor {
        &self.test
    }

    pub fn char_dict(&self) -> &CharDictionary {
        &self.char_dict
    }
}

/// Contiguous `[offset, offset + batch_size)` slices along the first dimension.
/// The final slice may be shorter.
pub fn batches(data: &Tensor, batch_size: i64) -> impl Iterator<Item = (i64, Tensor)> + '_ {
    let examples = data.size()[0];
    (0..examples)
        .step_by(batch_size.max(1) as usize)
        .map(move |offset| {
            let len = batch_size.min(examples - offset);
            (offset, data.narrow(0, offset, len))
        })
}
