use anyhow::{Context, Result};
use tch::{
    Tensor,
    nn::{Adam, Optimizer, OptimizerConfig, VarStore},
};

use crate::{
    constants::{HIGH_LEARNING_RATE, LEARNING_RATE_PERIOD, LOW_LEARNING_RATE},
    dataset::batches,
    model::Vae,
    plot::LossPlot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningRate {
    High,
    Low,
}

/// Picks the optimizer for the batch starting at example `offset`. The two rates alternate
/// every `LEARNING_RATE_PERIOD` examples, starting high. This is a fixed cycle chosen to
/// shake the model out of local minima, not a tuned schedule.
pub fn optimizer_for(offset: i64) -> LearningRate {
    if (offset / LEARNING_RATE_PERIOD) % 2 == 0 {
        LearningRate::High
    } else {
        LearningRate::Low
    }
}

/// Result of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub total_loss: f64,
    /// `(batch index, loss)` in batch order.
    pub trace: Vec<(usize, f64)>,
    /// The rate each batch was trained with, parallel to `trace`.
    pub rates: Vec<LearningRate>,
}

pub struct VaeTrainer<M: Vae> {
    var_store: VarStore,
    model: M,
    optimizer_high: Optimizer,
    optimizer_low: Optimizer,
}

impl<M: Vae> VaeTrainer<M> {
    /// Builds both Adam optimizers over every variable in `var_store`.
    pub fn new(var_store: VarStore, model: M) -> Result<Self> {
        let optimizer_high = Adam::default()
            .build(&var_store, HIGH_LEARNING_RATE)
            .context("failed to create high-rate Adam optimizer")?;
        let optimizer_low = Adam::default()
            .build(&var_store, LOW_LEARNING_RATE)
            .context("failed to create low-rate Adam optimizer")?;
        Ok(VaeTrainer {
            var_store,
            model,
            optimizer_high,
            optimizer_low,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// One pass over `data` in contiguous batches. The loss trace goes to `plot` after the
    /// last batch and before returning.
    pub fn train(&mut self, data: &Tensor, batch_size: i64, plot: &mut dyn LossPlot) -> Result<TrainReport> {
        let mut total_loss = 0.0;
        let mut trace = Vec::new();
        let mut rates = Vec::new();
        let mut previous_rate = None;
        for (offset, batch) in batches(data, batch_size) {
            let batch_index = (offset / batch_size) as usize;
            let rate = optimizer_for(offset);
            if previous_rate.is_some_and(|previous| previous != rate) {
                log::info!("Changing learning rate...");
            }
            previous_rate = Some(rate);

            let loss = self.train_step(&batch, rate)?;
            println!("Batch {} loss: {}", batch_index, loss);
            total_loss += loss;
            trace.push((batch_index, loss));
            rates.push(rate);
        }
        plot.show(&trace)?;
        Ok(TrainReport {
            total_loss,
            trace,
            rates,
        })
    }

    // Forward, ELBO loss, backprop, and one update by the scheduled optimizer.
    fn train_step(&mut self, batch: &Tensor, rate: LearningRate) -> Result<f64> {
        let batch = batch.to_device(self.var_store.device());
        let (reconstruction, mu, logvar) = self.model.forward(&batch);
        let loss = self.model.loss(&reconstruction, &batch, &mu, &logvar);
        match rate {
            LearningRate::High => self.optimizer_high.backward_step(&loss),
            LearningRate::Low => self.optimizer_low.backward_step(&loss),
        }
        f64::try_from(&loss).context("couldn't compute f64 from loss tensor")
    }

    /// Mean per-molecule loss over `data` without updating any parameters. Each batch loss
    /// is weighted by its size, so a short final batch counts for its molecules only.
    pub fn evaluate(&self, data: &Tensor, batch_size: i64) -> Result<f64> {
        let _no_grad_guard = tch::no_grad_guard();
        let mut total_loss = 0.0;
        let mut molecules = 0;
        for (_, batch) in batches(data, batch_size) {
            let batch = batch.to_device(self.var_store.device());
            let examples = batch.size()[0];
            let (reconstruction, mu, logvar) = self.model.forward(&batch);
            let loss = self.model.loss(&reconstruction, &batch, &mu, &logvar);
            total_loss += f64::try_from(&loss).context("couldn't compute f64 from loss tensor")? * examples as f64;
            molecules += examples;
        }
        Ok(if molecules == 0 { 0.0 } else { total_loss / molecules as f64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MolVae, VaeConfig};
    use tch::{Device, Kind};

    const CONFIG: VaeConfig = VaeConfig {
        seq_len: 5,
        alphabet_size: 4,
        hidden_dim: 16,
        latent_dim: 2,
    };

    #[derive(Default)]
    struct RecordingPlot {
        calls: Vec<Vec<(usize, f64)>>,
    }

    impl LossPlot for RecordingPlot {
        fn show(&mut self, trace: &[(usize, f64)]) -> Result<()> {
            self.calls.push(trace.to_vec());
            Ok(())
        }
    }

    /// Deterministic stand-in: a molecule's loss is how many of its positions hold character 0.
    struct CountingVae;

    impl Vae for CountingVae {
        fn forward(&self, input: &Tensor) -> (Tensor, Tensor, Tensor) {
            let latent = Tensor::zeros([input.size()[0], 1], (Kind::Float, Device::Cpu));
            (input.shallow_clone(), latent.copy(), latent)
        }

        fn loss(&self, _: &Tensor, target: &Tensor, _: &Tensor, _: &Tensor) -> Tensor {
            target.select(2, 0).sum(Kind::Float) / target.size()[0] as f64
        }
    }

    fn setup_trainer() -> VaeTrainer<MolVae> {
        let var_store = VarStore::new(Device::Cpu);
        let model = MolVae::new(&var_store.root(), CONFIG);
        VaeTrainer::new(var_store, model).unwrap()
    }

    fn random_one_hot(examples: i64) -> Tensor {
        Tensor::randint(CONFIG.alphabet_size, [examples, CONFIG.seq_len], (Kind::Int64, Device::Cpu))
            .one_hot(CONFIG.alphabet_size)
            .to_kind(Kind::Float)
    }

    #[test]
    fn test_schedule_starts_high_and_alternates() {
        assert_eq!(optimizer_for(0), LearningRate::High);
        assert_eq!(optimizer_for(9_000), LearningRate::High);
        assert_eq!(optimizer_for(10_000), LearningRate::Low);
        assert_eq!(optimizer_for(19_000), LearningRate::Low);
        assert_eq!(optimizer_for(20_000), LearningRate::High);
        for offset in (0..100_000).step_by(1000) {
            let high = (offset / 10_000) % 2 == 0;
            assert_eq!(optimizer_for(offset) == LearningRate::High, high, "offset {}", offset);
        }
    }

    #[test]
    fn test_schedule_switches_every_ten_batches_of_thousand() {
        let rates: Vec<_> = (0..30).map(|batch| optimizer_for(batch * 1000)).collect();
        assert!(rates[..10].iter().all(|r| *r == LearningRate::High));
        assert!(rates[10..20].iter().all(|r| *r == LearningRate::Low));
        assert!(rates[20..].iter().all(|r| *r == LearningRate::High));
    }

    #[test]
    fn test_total_loss_is_sum_of_trace() -> Result<()> {
        let mut trainer = setup_trainer();
        let mut plot = RecordingPlot::default();
        let report = trainer.train(&random_one_hot(25), 10, &mut plot)?;
        assert_eq!(report.trace.len(), 3);
        let indices: Vec<usize> = report.trace.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let summed: f64 = report.trace.iter().map(|(_, loss)| loss).sum();
        assert!((report.total_loss - summed).abs() < 1e-9);
        assert!(report.total_loss.is_finite());
        Ok(())
    }

    #[test]
    fn test_plot_receives_full_trace_once() -> Result<()> {
        let mut trainer = setup_trainer();
        let mut plot = RecordingPlot::default();
        let report = trainer.train(&random_one_hot(30), 10, &mut plot)?;
        assert_eq!(plot.calls.len(), 1);
        assert_eq!(plot.calls[0], report.trace);
        Ok(())
    }

    #[test]
    fn test_rates_follow_schedule() -> Result<()> {
        let mut trainer = setup_trainer();
        let mut plot = RecordingPlot::default();
        let report = trainer.train(&random_one_hot(40), 10, &mut plot)?;
        assert_eq!(report.rates, vec![LearningRate::High; 4]);
        Ok(())
    }

    #[test]
    fn test_loss_decreases_on_repeated_batch() -> Result<()> {
        let mut trainer = setup_trainer();
        let batch = random_one_hot(8);
        let first_loss = trainer.train_step(&batch, LearningRate::High)?;
        let mut last_loss = first_loss;
        for _ in 0..100 {
            last_loss = trainer.train_step(&batch, LearningRate::High)?;
        }
        assert!(
            last_loss < first_loss,
            "Loss should decrease after repeated training on same input: first={}, last={}",
            first_loss,
            last_loss
        );
        Ok(())
    }

    #[test]
    fn test_evaluate_weights_short_final_batch() -> Result<()> {
        // Ten molecules of character 0 (loss 5 each), then two of character 1 (loss 0).
        let indices = Tensor::cat(
            &[
                Tensor::zeros([10, CONFIG.seq_len], (Kind::Int64, Device::Cpu)),
                Tensor::ones([2, CONFIG.seq_len], (Kind::Int64, Device::Cpu)),
            ],
            0,
        );
        let data = indices.one_hot(CONFIG.alphabet_size).to_kind(Kind::Float);
        let trainer = VaeTrainer::new(VarStore::new(Device::Cpu), CountingVae)?;
        let batched = trainer.evaluate(&data, 10)?;
        let whole = trainer.evaluate(&data, 12)?;
        assert!((batched - 50.0 / 12.0).abs() < 1e-6, "got {}", batched);
        assert!((batched - whole).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_evaluate_leaves_parameters_untouched() -> Result<()> {
        let trainer = setup_trainer();
        let before: Vec<Tensor> = trainer.var_store.trainable_variables().iter().map(|t| t.copy()).collect();
        let loss = trainer.evaluate(&random_one_hot(12), 5)?;
        assert!(loss.is_finite() && loss > 0.0);
        for (old, new) in before.iter().zip(trainer.var_store.trainable_variables()) {
            assert!(old.equal(&new));
        }
        Ok(())
    }
}
