use tch::{
    Kind::Float,
    Reduction, Tensor,
    nn::{Linear, Path, linear},
};

use crate::constants::{ALPHABET_SIZE, HIDDEN_DIM, LATENT_DIM, MAX_SMILE_LENGTH};

/// Clamp applied to reconstructions before the log terms of the cross-entropy.
const PROBABILITY_EPSILON: f64 = 1e-7;

/// A variational autoencoder over one-hot sequences.
pub trait Vae {
    /// Encodes and decodes a `[batch, seq_len, alphabet]` tensor, returning
    /// `(reconstruction, mu, logvar)`.
    fn forward(&self, input: &Tensor) -> (Tensor, Tensor, Tensor);

    /// Evidence-lower-bound loss as a scalar tensor.
    fn loss(&self, reconstruction: &Tensor, target: &Tensor, mu: &Tensor, logvar: &Tensor) -> Tensor;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaeConfig {
    pub seq_len: i64,
    pub alphabet_size: i64,
    pub hidden_dim: i64,
    pub latent_dim: i64,
}

impl Default for VaeConfig {
    fn default() -> Self {
        VaeConfig {
            seq_len: MAX_SMILE_LENGTH,
            alphabet_size: ALPHABET_SIZE,
            hidden_dim: HIDDEN_DIM,
            latent_dim: LATENT_DIM,
        }
    }
}

/// Dense encoder/decoder pair around a Gaussian latent space.
pub struct MolVae {
    config: VaeConfig,
    encoder_hidden: Linear,
    encoder_mu: Linear,
    encoder_logvar: Linear,
    decoder_hidden: Linear,
    decoder_output: Linear,
}

impl MolVae {
    pub fn new(vs: &Path, config: VaeConfig) -> Self {
        let input_dim = config.seq_len * config.alphabet_size;
        let encoder_hidden = linear(vs / "encoder_hidden", input_dim, config.hidden_dim, Default::default());
        let encoder_mu = linear(vs / "encoder_mu", config.hidden_dim, config.latent_dim, Default::default());
        let encoder_logvar = linear(
            vs / "encoder_logvar",
            config.hidden_dim,
            config.latent_dim,
            Default::default(),
        );
        let decoder_hidden = linear(vs / "decoder_hidden", config.latent_dim, config.hidden_dim, Default::default());
        let decoder_output = linear(vs / "decoder_output", config.hidden_dim, input_dim, Default::default());
        MolVae {
            config,
            encoder_hidden,
            encoder_mu,
            encoder_logvar,
            decoder_hidden,
            decoder_output,
        }
    }

    pub fn config(&self) -> VaeConfig {
        self.config
    }

    /// `[batch, seq_len, alphabet]` -> `(mu, logvar)`, each `[batch, latent_dim]`.
    fn encode(&self, input: &Tensor) -> (Tensor, Tensor) {
        // Flatten every position into one feature vector per molecule.
        let hidden = input.flatten(1, -1).apply(&self.encoder_hidden).relu();
        (hidden.apply(&self.encoder_mu), hidden.apply(&self.encoder_logvar))
    }

    /// z = mu + sigma * epsilon, with sigma = exp(logvar / 2).
    fn reparameterize(mu: &Tensor, logvar: &Tensor) -> Tensor {
        let sigma = (logvar * 0.5).exp();
        let epsilon = sigma.randn_like();
        mu + sigma * epsilon
    }

    /// `[batch, latent_dim]` -> per-position character distributions `[batch, seq_len, alphabet]`.
    fn decode(&self, z: &Tensor) -> Tensor {
        z.apply(&self.decoder_hidden)
            .relu()
            .apply(&self.decoder_output)
            .view([-1, self.config.seq_len, self.config.alphabet_size])
            .softmax(-1, Float)
    }
}

impl Vae for MolVae {
    fn forward(&self, input: &Tensor) -> (Tensor, Tensor, Tensor) {
        let (mu, logvar) = self.encode(input);
        let z = Self::reparameterize(&mu, &logvar);
        (self.decode(&z), mu, logvar)
    }

    /// Binary cross-entropy of the reconstruction plus KL divergence from the unit Gaussian,
    /// summed per molecule and averaged over the batch.
    fn loss(&self, reconstruction: &Tensor, target: &Tensor, mu: &Tensor, logvar: &Tensor) -> Tensor {
        let batch = reconstruction.size()[0].max(1) as f64;
        let reconstruction_loss = reconstruction
            .clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON)
            .binary_cross_entropy::<Tensor>(target, None, Reduction::Sum);
        // KL = -0.5 * sum(1 + logvar - mu^2 - exp(logvar))
        let kl_divergence = (mu.square() + logvar.exp() - logvar - 1.0).sum(Float) * 0.5;
        (reconstruction_loss + kl_divergence) / batch
    }
}
