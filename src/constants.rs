/// Number of training examples per batch. The generator also replicates its seed across this many rows.
pub const BATCH_SIZE: i64 = 1000;
/// Fixed length every SMILES string is padded to.
pub const MAX_SMILE_LENGTH: i64 = 120;
/// Number of distinct characters in the dictionary; the last one is padding.
pub const ALPHABET_SIZE: i64 = 55;
/// Width of the dense layer on either side of the latent space.
pub const HIDDEN_DIM: i64 = 512;
/// Dimensionality of the latent space.
pub const LATENT_DIM: i64 = 292;

/// Learning rate used for the first learning-rate period and every other one after that.
pub const HIGH_LEARNING_RATE: f64 = 0.01;
/// Learning rate used for the alternate periods.
pub const LOW_LEARNING_RATE: f64 = 0.001;
/// Number of examples processed before switching between the two optimizers.
pub const LEARNING_RATE_PERIOD: i64 = 10_000;

/// Padding character. Generated strings end at its first occurrence.
pub const PAD_CHAR: char = ' ';

/// Safetensors container written by the preprocessing step.
pub const DATA_FILE: &str = "chembl22/chembl22.safetensors";
pub const TRAIN_NAME: &str = "train";
pub const TEST_NAME: &str = "test";
pub const DICT_NAME: &str = "dict";

/// Molecules used as generation seeds after training.
pub const SEED_SMILES: [&str; 3] = ["HC(H)=C(H)(H)", "CCC", "CH"];
