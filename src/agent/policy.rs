//! Stochastic action sampler with a likelihood-ratio loss.

use burn::prelude::*;
use burn::tensor::activation::{sigmoid, softmax};
use rand::Rng;

use crate::error::{AgentError, Result};

use super::Sampleable;
use super::action::ActionSpec;
use super::distributions::ActionDistribution;
use super::network::{ActionNet, ActionNetConfig};
use super::observation::{AgentObs, ObsSpec, stack_obs};

/// Guard against log-of-zero when scoring sampled values.
const LOG_EPS: f32 = 1e-8;

/// One sampled action together with the distribution it was drawn from.
#[derive(Debug, Clone)]
struct SampleRecord<B: Backend> {
    value: f32,
    dist: ActionDistribution<B>,
}

/// Samples one action per declared [`ActionSpec`] from network-parameterized
/// distributions and keeps the per-call record needed to score the step with
/// a REINFORCE-style loss.
///
/// The output head is sliced into three contiguous blocks in declared-spec
/// order: two Beta parameters per continuous spec, one logistic probability
/// per binary spec, and a softmaxed sub-vector for the (at most one)
/// categorical spec. The head output is passed through `abs` before slicing,
/// which keeps Beta shape parameters valid without a softplus.
pub struct PolicySampler<B: Backend> {
    pub(crate) net: ActionNet<B>,
    specs: Vec<ActionSpec>,
    obs_spec: ObsSpec,
    device: B::Device,
    record: Vec<SampleRecord<B>>,
}

impl<B: Backend> PolicySampler<B> {
    pub fn new(
        config: &ActionNetConfig,
        specs: Vec<ActionSpec>,
        device: &B::Device,
    ) -> Result<Self> {
        if specs.is_empty() {
            return Err(AgentError::Precondition(
                "at least one action spec is required".into(),
            ));
        }
        let categorical = specs
            .iter()
            .filter(|s| matches!(s, ActionSpec::Categorical { .. }))
            .count();
        if categorical > 1 {
            return Err(AgentError::Precondition(format!(
                "at most one categorical action spec is supported, got {categorical}"
            )));
        }

        let out_width: usize = specs.iter().map(ActionSpec::param_width).sum();
        Ok(Self {
            net: config.init(out_width, device),
            specs,
            obs_spec: config.obs.clone(),
            device: device.clone(),
            record: Vec::new(),
        })
    }

    pub fn specs(&self) -> &[ActionSpec] {
        &self.specs
    }

    /// Sum of `−log_prob(sample + ε)·reward` over the last sampling call.
    ///
    /// Returns `Ok(None)` before the first forward pass. A non-finite
    /// accumulated loss is a numerical defect and is surfaced as an error.
    pub fn compute_loss(&self, reward: f32) -> Result<Option<Tensor<B, 1>>> {
        if self.record.is_empty() {
            tracing::debug!("no sampled step to score");
            return Ok(None);
        }

        let mut loss: Option<Tensor<B, 1>> = None;
        for sample in &self.record {
            let term = sample.dist.log_prob(sample.value + LOG_EPS).neg() * reward;
            loss = Some(match loss {
                Some(acc) => acc + term,
                None => term,
            });
        }
        let loss = loss.expect("record is non-empty");

        let value = loss.clone().into_data().to_vec::<f32>().unwrap()[0];
        if !value.is_finite() {
            tracing::error!(loss = value, "non-finite policy loss");
            return Err(AgentError::NonFiniteLoss);
        }
        Ok(Some(loss))
    }

    fn sample_step<R: Rng>(&mut self, obs: &AgentObs, rng: &mut R) -> Result<Vec<String>> {
        if !obs.conforms_to(&self.obs_spec) {
            return Err(AgentError::Precondition(
                "observation does not match the network's shape contract".into(),
            ));
        }

        let (grid, target, pos) = stack_obs::<B>(&[obs], &self.obs_spec, &self.device);
        let params: Tensor<B, 1> = self.net.forward(grid, target, pos).squeeze::<1>(0).abs();

        let continuous: Vec<&ActionSpec> = self
            .specs
            .iter()
            .filter(|s| matches!(s, ActionSpec::Continuous { .. }))
            .collect();
        let binary: Vec<&ActionSpec> = self
            .specs
            .iter()
            .filter(|s| matches!(s, ActionSpec::Binary { .. }))
            .collect();
        let categorical = self
            .specs
            .iter()
            .find(|s| matches!(s, ActionSpec::Categorical { .. }));

        let len_cont = 2 * continuous.len();
        let len_bin = binary.len();
        let out_width = params.dims()[0];

        self.record.clear();
        let mut commands = Vec::with_capacity(self.specs.len());

        for (i, spec) in continuous.iter().enumerate() {
            let alpha = params.clone().slice([2 * i..2 * i + 1]);
            let beta = params.clone().slice([2 * i + 1..2 * i + 2]);
            let dist = ActionDistribution::Beta { alpha, beta };
            let value = dist.sample(rng)?;
            commands.push(spec.to_command(value));
            self.record.push(SampleRecord { value, dist });
        }

        if len_bin > 0 {
            let probs = sigmoid(params.clone().slice([len_cont..len_cont + len_bin]));
            for (i, spec) in binary.iter().enumerate() {
                let p = probs.clone().slice([i..i + 1]);
                let complement = p.clone().neg() + 1.0;
                let dist = ActionDistribution::TwoPoint {
                    probs: Tensor::cat(vec![p, complement], 0),
                };
                let value = dist.sample(rng)?;
                commands.push(spec.to_command(value));
                self.record.push(SampleRecord { value, dist });
            }
        }

        if let Some(spec) = categorical {
            let probs = softmax(params.slice([len_cont + len_bin..out_width]), 0);
            let dist = ActionDistribution::Categorical { probs };
            let value = dist.sample(rng)?;
            commands.push(spec.to_command(value));
            self.record.push(SampleRecord { value, dist });
        }

        Ok(commands)
    }
}

impl<B: Backend> Sampleable for PolicySampler<B> {
    fn sample_commands<R: Rng>(&mut self, obs: &AgentObs, rng: &mut R) -> Result<Vec<String>> {
        self.sample_step(obs, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type B = NdArray;

    fn walking_specs() -> Vec<ActionSpec> {
        vec![
            ActionSpec::continuous("move", -1.0, 1.0),
            ActionSpec::continuous("turn", -1.0, 1.0),
            ActionSpec::binary("jump"),
        ]
    }

    fn test_obs(spec: &ObsSpec) -> AgentObs {
        AgentObs::new(
            vec![0.5; spec.grid_input_len()],
            vec![0.1; spec.target_len],
            vec![0.2; spec.pos_len],
        )
    }

    #[test]
    fn test_one_command_per_spec() {
        let config = ActionNetConfig::default();
        let mut sampler =
            PolicySampler::<B>::new(&config, walking_specs(), &Default::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let commands = sampler
            .sample_commands(&test_obs(&config.obs), &mut rng)
            .unwrap();

        assert_eq!(commands.len(), 3);
        assert!(commands[0].starts_with("move "));
        assert!(commands[1].starts_with("turn "));
        assert!(commands[2] == "jump 0" || commands[2] == "jump 1");
    }

    #[test]
    fn test_categorical_command_is_a_name() {
        let names = ["movenorth 1", "movesouth 1", "movewest 1", "moveeast 1"];
        let config = ActionNetConfig::default();
        let mut sampler = PolicySampler::<B>::new(
            &config,
            vec![ActionSpec::categorical(&names)],
            &Default::default(),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let commands = sampler
            .sample_commands(&test_obs(&config.obs), &mut rng)
            .unwrap();
        assert_eq!(commands.len(), 1);
        assert!(names.contains(&commands[0].as_str()));
    }

    #[test]
    fn test_rejects_multiple_categorical_specs() {
        let config = ActionNetConfig::default();
        let result = PolicySampler::<B>::new(
            &config,
            vec![
                ActionSpec::categorical(&["a", "b"]),
                ActionSpec::categorical(&["c", "d"]),
            ],
            &Default::default(),
        );
        assert!(matches!(result, Err(AgentError::Precondition(_))));
    }

    #[test]
    fn test_loss_requires_a_sampled_step() {
        let config = ActionNetConfig::default();
        let sampler =
            PolicySampler::<B>::new(&config, walking_specs(), &Default::default()).unwrap();
        assert!(sampler.compute_loss(1.0).unwrap().is_none());
    }

    #[test]
    fn test_loss_is_finite_and_scales_with_reward() {
        let config = ActionNetConfig::default();
        let mut sampler =
            PolicySampler::<B>::new(&config, walking_specs(), &Default::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        sampler
            .sample_commands(&test_obs(&config.obs), &mut rng)
            .unwrap();

        let loss = sampler.compute_loss(2.5).unwrap().unwrap();
        let value = loss.into_data().to_vec::<f32>().unwrap()[0];
        assert!(value.is_finite());

        let zero = sampler.compute_loss(0.0).unwrap().unwrap();
        let zero = zero.into_data().to_vec::<f32>().unwrap()[0];
        assert!(zero.abs() < 1e-6);
    }

    #[test]
    fn test_loss_backpropagates() {
        let config = ActionNetConfig::default();
        let mut sampler =
            PolicySampler::<Autodiff<B>>::new(&config, walking_specs(), &Default::default())
                .unwrap();
        let mut rng = StdRng::seed_from_u64(19);

        sampler
            .sample_commands(&test_obs(&config.obs), &mut rng)
            .unwrap();
        let loss = sampler.compute_loss(-1.0).unwrap().unwrap();
        let _grads = loss.backward();
    }

    #[test]
    fn test_each_call_replaces_the_record() {
        let config = ActionNetConfig::default();
        let mut sampler =
            PolicySampler::<B>::new(&config, walking_specs(), &Default::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let obs = test_obs(&config.obs);

        sampler.sample_commands(&obs, &mut rng).unwrap();
        assert_eq!(sampler.record.len(), 3);
        sampler.sample_commands(&obs, &mut rng).unwrap();
        assert_eq!(sampler.record.len(), 3);
    }
}
