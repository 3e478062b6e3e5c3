use anyhow::{Result, anyhow, bail};
use tch::{Kind, Tensor};

use crate::constants::PAD_CHAR;

/// Index-addressable character set of the training data.
/// By convention the final entry is the padding character.
#[derive(Debug, Clone, PartialEq)]
pub struct CharDictionary {
    chars: Vec<char>,
}

impl CharDictionary {
    /// Builds a dictionary from byte-encoded entries, one byte per character.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut chars = Vec::with_capacity(bytes.len());
        for &byte in bytes {
            if !byte.is_ascii() {
                return Err(anyhow!("Non-ASCII dictionary entry: {:#04x}", byte));
            }
            let c = byte as char;
            if chars.contains(&c) {
                return Err(anyhow!("Duplicate dictionary entry: {:?}", c));
            }
            chars.push(c);
        }
        Ok(CharDictionary { chars })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn index_of(&self, c: char) -> Option<usize> {
        self.chars.iter().position(|&entry| entry == c)
    }

    pub fn decode(&self, index: usize) -> Result<char> {
        self.chars
            .get(index)
            .copied()
            .ok_or_else(|| anyhow!("Character index {} out of range for dictionary of {}", index, self.len()))
    }

    /// One-hot encodes an already padded SMILES string into a `[len, dict_len]` float tensor.
    pub fn one_hot_smile(&self, smile: &str) -> Result<Tensor> {
        let mut indices = Vec::with_capacity(smile.len());
        for c in smile.chars() {
            let index = self
                .index_of(c)
                .ok_or_else(|| anyhow!("Character {:?} is not in the dictionary", c))?;
            indices.push(index as i64);
        }
        let indices = Tensor::from_slice(&indices);
        Ok(indices.one_hot(self.len() as i64).to_kind(Kind::Float))
    }
}

/// Right-pads a SMILES string with the padding character up to `length`.
pub fn pad_smile(smile: &str, length: usize) -> Result<String> {
    let count = smile.chars().count();
    if count > length {
        bail!("SMILES string of {} characters exceeds the maximum of {}", count, length);
    }
    let mut padded = String::with_capacity(length);
    padded.push_str(smile);
    padded.extend(std::iter::repeat_n(PAD_CHAR, length - count));
    Ok(padded)
}
