//! Two-network temporal-difference training loop.
//!
//! The trainer owns a policy network and a structurally identical target
//! network. Only the policy network is ever optimized; the target network
//! tracks it through a fixed convex blend and exists solely to stabilize the
//! TD target. It also owns the replay memory and the "previous step" scratch
//! state that turns per-step observations into stored transitions.

use std::path::{Path, PathBuf};

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;

use crate::error::{AgentError, Result};

use super::ValueEstimator;
use super::action::ActionSpec;
use super::network::{ActionNet, ActionNetConfig};
use super::observation::AgentObs;
use super::qnet::QNetwork;
use super::replay::{ActionRecord, ReplayMemory, Transition};

/// Minimum live transitions before a loss is available.
const MIN_TRANSITIONS: usize = 5;

/// Weight of the policy network in the target blend:
/// `target ← 0.4·policy + 0.6·target`. A slow-tracking target, not a
/// periodic hard copy.
const TARGET_BLEND: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct DqnTrainerConfig {
    /// Discount factor for future value.
    pub gamma: f32,
    /// Transitions sampled per loss computation (clamped to the live count).
    pub batch_size: usize,
    /// Loss computations between replay checkpoints + target blends.
    pub target_update: usize,
    /// Replay memory capacity.
    pub capacity: usize,
    /// Replay checkpoint location; reloaded on construction when present.
    pub memory_path: PathBuf,
    /// Optimizer step size used by [`DqnTrainer::learn`].
    pub learning_rate: f64,
    /// Shared network body configuration.
    pub net: ActionNetConfig,
}

impl Default for DqnTrainerConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            batch_size: 70,
            target_update: 40,
            capacity: 500,
            memory_path: PathBuf::from("memory.bin"),
            learning_rate: 5e-4,
            net: ActionNetConfig::default(),
        }
    }
}

pub struct DqnTrainer<B: AutodiffBackend> {
    policy: QNetwork<B>,
    target: QNetwork<B>,
    memory: ReplayMemory,
    config: DqnTrainerConfig,
    device: B::Device,
    rng: StdRng,
    /// The last observation/action pair, completed into a transition by the
    /// next step or by episode end.
    pending: Option<(AgentObs, u32)>,
    /// Loss computations so far; drives the checkpoint/blend cadence.
    iteration: usize,
}

impl<B: AutodiffBackend> DqnTrainer<B> {
    /// Build both networks and reload the replay checkpoint if one exists at
    /// the configured path.
    pub fn new(
        config: DqnTrainerConfig,
        spec: ActionSpec,
        device: &B::Device,
        mut rng: StdRng,
    ) -> Result<Self> {
        let policy = QNetwork::new(&config.net, spec.clone(), device)?;
        let target = QNetwork::new(&config.net, spec, device)?;

        let memory = if config.memory_path.exists() {
            ReplayMemory::load(&config.memory_path, config.capacity, &config.net.obs, &mut rng)?
        } else {
            ReplayMemory::new(config.capacity)
        };

        Ok(Self {
            policy,
            target,
            memory,
            config,
            device: device.clone(),
            rng,
            pending: None,
            iteration: 0,
        })
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// One control step: store the transition completed by `state`/`reward`,
    /// pick the next action epsilon-greedily, and return it encoded as
    /// dispatchable commands.
    pub fn step(&mut self, state: AgentObs, reward: f32, epsilon: f32) -> Result<Vec<String>> {
        let action = self.policy.sample(&state, epsilon, &mut self.rng)?;

        if let Some((prev_state, prev_action)) = self.pending.take() {
            self.memory.push(Transition {
                state: prev_state,
                action: ActionRecord::Discrete(prev_action),
                next_state: Some(state.clone()),
                reward,
            });
        }
        self.pending = Some((state, action as u32));

        Ok(vec![self.policy.command_for(action)])
    }

    /// Record the terminal transition of an episode and forget the pending
    /// pair. Silently does nothing when no step preceded it.
    pub fn push_final(&mut self, reward: f32) {
        match self.pending.take() {
            Some((state, action)) => {
                self.memory.push(Transition {
                    state,
                    action: ActionRecord::Discrete(action),
                    next_state: None,
                    reward,
                });
            }
            None => tracing::debug!("no pending transition to finalize"),
        }
    }

    /// Forget the pending pair without recording anything, e.g. when an
    /// episode is abandoned externally.
    pub fn clear_state(&mut self) {
        self.pending = None;
    }

    /// Sample a minibatch and compute the TD loss.
    ///
    /// Returns `Ok(None)` while fewer than five transitions are stored —
    /// training simply skips that step. Every `target_update`-th call also
    /// checkpoints the replay memory and blends the target network toward
    /// the policy network.
    pub fn compute_loss(&mut self) -> Result<Option<Tensor<B, 1>>> {
        if self.memory.len() < MIN_TRANSITIONS {
            tracing::debug!(stored = self.memory.len(), "not enough transitions for a loss");
            return Ok(None);
        }

        let k = self.config.batch_size.min(self.memory.len());
        let batch: Vec<Transition> = self
            .memory
            .sample(k, &mut self.rng)?
            .into_iter()
            .cloned()
            .collect();

        let mut actions = Vec::with_capacity(k);
        for transition in &batch {
            match transition.action {
                ActionRecord::Discrete(index) => actions.push(index as i64),
                ActionRecord::PerSpec(_) => return Err(AgentError::MalformedAction),
            }
        }

        // Q(s, a) under the policy net, at the actions actually taken.
        let states: Vec<&AgentObs> = batch.iter().map(|t| &t.state).collect();
        let q_all = self.policy.q_values(&states)?;
        let index = Tensor::<B, 1, Int>::from_ints(actions.as_slice(), &self.device).reshape([k, 1]);
        let q_taken = q_all.gather(1, index).squeeze::<1>(1);

        // max_a' Q(s', a') under the target net; terminal rows contribute
        // exactly zero.
        let survivors: Vec<(usize, &AgentObs)> = batch
            .iter()
            .enumerate()
            .filter_map(|(row, t)| t.next_state.as_ref().map(|next| (row, next)))
            .collect();
        let mut next_max: Vec<Option<f32>> = vec![None; k];
        if !survivors.is_empty() {
            let next_states: Vec<&AgentObs> = survivors.iter().map(|(_, next)| *next).collect();
            let best = self
                .target
                .q_values(&next_states)?
                .max_dim(1)
                .squeeze::<1>(1)
                .into_data()
                .to_vec::<f32>()
                .unwrap();
            for ((row, _), value) in survivors.iter().zip(best) {
                next_max[*row] = Some(value);
            }
        }

        let rewards: Vec<f32> = batch.iter().map(|t| t.reward).collect();
        let expected = td_targets(&rewards, &next_max, self.config.gamma);
        let expected = Tensor::<B, 1>::from_floats(expected.as_slice(), &self.device);

        let loss = (q_taken - expected).powf_scalar(2.0).mean();

        self.iteration += 1;
        if self.iteration % self.config.target_update == 0 {
            self.memory.save(&self.config.memory_path)?;
            tracing::debug!(iteration = self.iteration, "blending target network");
            self.target.net =
                ActionNet::blend(self.target.net.clone(), &self.policy.net, TARGET_BLEND);
        }

        let value = loss.clone().into_data().to_vec::<f32>().unwrap()[0];
        if !value.is_finite() {
            tracing::error!(loss = value, "non-finite TD loss");
            return Err(AgentError::NonFiniteLoss);
        }
        Ok(Some(loss))
    }

    /// Run up to `rounds` loss computations, each followed by an optimizer
    /// step on the policy network. Rounds without an available loss are
    /// skipped. Returns the mean observed loss, if any.
    pub fn learn<O>(&mut self, optimizer: &mut O, rounds: usize) -> Result<Option<f32>>
    where
        O: Optimizer<ActionNet<B>, B>,
    {
        let mut losses = Vec::new();
        for _ in 0..rounds {
            let Some(loss) = self.compute_loss()? else {
                continue;
            };
            let value = loss.clone().into_data().to_vec::<f32>().unwrap()[0];
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.policy.net);
            self.policy.net =
                optimizer.step(self.config.learning_rate, self.policy.net.clone(), grads);
            losses.push(value);
        }

        if losses.is_empty() {
            Ok(None)
        } else {
            let mean = losses.iter().sum::<f32>() / losses.len() as f32;
            tracing::debug!(loss = mean, rounds = losses.len(), "optimized policy network");
            Ok(Some(mean))
        }
    }

    /// The externally visible model state: the target network's parameters.
    pub fn model_record(&self) -> <ActionNet<B> as Module<B>>::Record {
        self.target.net.clone().into_record()
    }

    /// Load one snapshot into both networks.
    pub fn apply_snapshot(&mut self, record: <ActionNet<B> as Module<B>>::Record) {
        self.policy.net = self.policy.net.clone().load_record(record);
        self.target.net = self
            .target
            .net
            .clone()
            .load_record(self.policy.net.clone().into_record());
    }

    /// Write the model snapshot (target-network parameters) to `path`.
    pub fn save_model(&self, path: &Path) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.target
            .net
            .clone()
            .save_file(path.to_path_buf(), &recorder)?;
        tracing::debug!(?path, "saved model snapshot");
        Ok(())
    }

    /// Reload both networks from a snapshot written by
    /// [`save_model`](Self::save_model).
    pub fn load_model(&mut self, path: &Path) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.policy.net = self
            .policy
            .net
            .clone()
            .load_file(path.to_path_buf(), &recorder, &self.device)?;
        self.target.net = self
            .target
            .net
            .clone()
            .load_file(path.to_path_buf(), &recorder, &self.device)?;
        tracing::debug!(?path, "loaded model snapshot");
        Ok(())
    }

    /// Q-values of the policy network for one observation, in outcome order.
    pub fn policy_q(&self, obs: &AgentObs) -> Result<Vec<f32>> {
        Ok(self
            .policy
            .q_values(&[obs])?
            .into_data()
            .to_vec::<f32>()
            .unwrap())
    }

    /// Q-values of the target network for one observation.
    pub fn target_q(&self, obs: &AgentObs) -> Result<Vec<f32>> {
        Ok(self
            .target
            .q_values(&[obs])?
            .into_data()
            .to_vec::<f32>()
            .unwrap())
    }
}

/// `expected = reward + gamma·max_a' Q(s', a')`, with terminal rows pinned
/// to the bare reward.
fn td_targets(rewards: &[f32], next_max: &[Option<f32>], gamma: f32) -> Vec<f32> {
    rewards
        .iter()
        .zip(next_max.iter())
        .map(|(reward, best)| reward + gamma * best.unwrap_or(0.0))
        .collect()
}
