//! Q-value view of the shared network with an epsilon-greedy selector.

use burn::prelude::*;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use crate::error::{AgentError, Result};

use super::ValueEstimator;
use super::action::ActionSpec;
use super::network::{ActionNet, ActionNetConfig};
use super::observation::{AgentObs, ObsSpec, stack_obs};

/// Reads the shared network's output head as one Q-value estimate per
/// categorical outcome. Only used with a single categorical spec, whose
/// outcome count fixes the head width.
pub struct QNetwork<B: Backend> {
    pub(crate) net: ActionNet<B>,
    spec: ActionSpec,
    obs_spec: ObsSpec,
    device: B::Device,
}

impl<B: Backend> QNetwork<B> {
    pub fn new(config: &ActionNetConfig, spec: ActionSpec, device: &B::Device) -> Result<Self> {
        let ActionSpec::Categorical { ref names } = spec else {
            return Err(AgentError::Precondition(
                "Q-value estimation requires a categorical action spec".into(),
            ));
        };
        if names.is_empty() {
            return Err(AgentError::Precondition(
                "categorical action spec has no outcomes".into(),
            ));
        }

        Ok(Self {
            net: config.init(names.len(), device),
            spec,
            obs_spec: config.obs.clone(),
            device: device.clone(),
        })
    }

    pub fn n_actions(&self) -> usize {
        self.spec.param_width()
    }

    /// Encode a selected outcome index as its command string.
    pub fn command_for(&self, index: usize) -> String {
        self.spec.to_command(index as f32)
    }

    fn forward(&self, batch: &[&AgentObs]) -> Result<Tensor<B, 2>> {
        if batch.is_empty() {
            return Err(AgentError::Precondition("empty observation batch".into()));
        }
        if let Some(obs) = batch.iter().find(|o| !o.conforms_to(&self.obs_spec)) {
            return Err(AgentError::Precondition(format!(
                "observation of shape ({}, {}, {}) does not match the network's contract",
                obs.grid.len(),
                obs.target.len(),
                obs.pos.len()
            )));
        }

        let (grid, target, pos) = stack_obs::<B>(batch, &self.obs_spec, &self.device);
        Ok(self.net.forward(grid, target, pos))
    }

    /// Epsilon-greedy selection on a single observation.
    ///
    /// Greedy with probability `1−epsilon`. The exploration branch does not
    /// draw uniformly: Q-values are shifted non-negative, the argmax entry
    /// is halved to bias away from re-selecting the greedy action, and an
    /// index is drawn from the result as unnormalized weights.
    pub fn sample<R: Rng>(&self, obs: &AgentObs, epsilon: f32, rng: &mut R) -> Result<usize> {
        let q = self.forward(&[obs])?.into_data().to_vec::<f32>().unwrap();
        let greedy = argmax(&q);

        if rng.random::<f32>() > epsilon {
            tracing::debug!(action = greedy, "argmax action");
            return Ok(greedy);
        }

        let weights = exploration_weights(&q);
        let dist = WeightedIndex::new(&weights)
            .map_err(|e| AgentError::InvalidDistribution(e.to_string()))?;
        let action = dist.sample(rng);
        tracing::debug!(action, "random action");
        Ok(action)
    }
}

impl<B: Backend> ValueEstimator<B> for QNetwork<B> {
    fn q_values(&self, batch: &[&AgentObs]) -> Result<Tensor<B, 2>> {
        self.forward(batch)
    }
}

/// Index of the first maximum.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Unnormalized exploration weights: shift non-negative, then halve the
/// argmax entry.
fn exploration_weights(q: &[f32]) -> Vec<f32> {
    let min = q.iter().copied().fold(f32::INFINITY, f32::min);
    let mut weights: Vec<f32> = if min < 0.0 {
        q.iter().map(|v| v - min).collect()
    } else {
        q.to_vec()
    };
    let greedy = argmax(q);
    weights[greedy] /= 2.0;
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type B = burn::backend::NdArray;

    fn make_qnet() -> (QNetwork<B>, AgentObs) {
        let config = ActionNetConfig::default();
        let spec = ActionSpec::categorical(&["movenorth 1", "movesouth 1", "movewest 1"]);
        let qnet = QNetwork::<B>::new(&config, spec, &Default::default()).unwrap();
        let obs = AgentObs::new(
            vec![0.4; config.obs.grid_input_len()],
            vec![0.6; config.obs.target_len],
            vec![0.1; config.obs.pos_len],
        );
        (qnet, obs)
    }

    #[test]
    fn test_rejects_non_categorical_spec() {
        let config = ActionNetConfig::default();
        let result = QNetwork::<B>::new(
            &config,
            ActionSpec::continuous("move", -1.0, 1.0),
            &Default::default(),
        );
        assert!(matches!(result, Err(AgentError::Precondition(_))));
    }

    #[test]
    fn test_q_values_batched_and_single() {
        let (qnet, obs) = make_qnet();
        assert_eq!(qnet.q_values(&[&obs]).unwrap().dims(), [1, 3]);
        assert_eq!(qnet.q_values(&[&obs, &obs, &obs, &obs]).unwrap().dims(), [4, 3]);
    }

    #[test]
    fn test_zero_epsilon_is_pure_argmax() {
        let (qnet, obs) = make_qnet();
        let q = qnet
            .q_values(&[&obs])
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let greedy = argmax(&q);

        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..25 {
            assert_eq!(qnet.sample(&obs, 0.0, &mut rng).unwrap(), greedy);
        }
    }

    #[test]
    fn test_full_epsilon_stays_in_range() {
        let (qnet, obs) = make_qnet();
        let mut rng = StdRng::seed_from_u64(29);
        for _ in 0..50 {
            let action = qnet.sample(&obs, 1.0, &mut rng).unwrap();
            assert!(action < qnet.n_actions());
        }
    }

    #[test]
    fn test_exploration_weights_shift_and_halve() {
        let weights = exploration_weights(&[-1.0, 3.0, 0.5]);
        assert_eq!(weights, vec![0.0, 2.0, 1.5]);
    }

    #[test]
    fn test_halving_lowers_argmax_mass_below_unbiased() {
        let q = [0.2, 1.0, 0.8, 0.6];
        let greedy = argmax(&q);

        let raw_mass = q[greedy] / q.iter().sum::<f32>();
        let weights = exploration_weights(&q);
        let biased_mass = weights[greedy] / weights.iter().sum::<f32>();

        assert!(biased_mass < raw_mass);
        assert!(biased_mass < 1.0 / q.len() as f32);
    }

    #[test]
    fn test_command_for_maps_to_names() {
        let (qnet, _) = make_qnet();
        assert_eq!(qnet.command_for(0), "movenorth 1");
        assert_eq!(qnet.command_for(2), "movewest 1");
    }
}
