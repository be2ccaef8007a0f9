//! Episode driver: glue between the trainer and an [`Environment`].

use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;

use crate::agent::{ActionNet, DqnTrainer, TrainingMetrics};
use crate::env::Environment;
use crate::error::Result;

/// Multiplicative per-step exploration decay with a floor.
#[derive(Debug, Clone)]
pub struct EpsilonSchedule {
    current: f32,
    end: f32,
    decay: f32,
}

impl EpsilonSchedule {
    pub fn new(start: f32, end: f32, decay: f32) -> Self {
        Self {
            current: start,
            end,
            decay,
        }
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn decay(&mut self) {
        self.current = (self.current * self.decay).max(self.end);
    }
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self::new(0.36, 0.05, 0.99)
    }
}

#[derive(Debug, Clone)]
pub struct EpisodeConfig {
    /// Hard cap on steps per episode.
    pub max_steps: usize,
    /// Optimization rounds attempted after each environment feedback.
    pub learn_rounds: usize,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            learn_rounds: 10,
        }
    }
}

/// Outcome of one episode.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeOutcome {
    pub total_reward: f32,
    pub steps: usize,
}

/// Steps a trainer through episodes against an environment.
///
/// Each round: take the world's feedback, optimize on the replay memory,
/// select the next action, dispatch it, decay epsilon. Training continues
/// stepping whether or not a loss was available on any given round.
pub struct EpisodeRunner {
    pub config: EpisodeConfig,
    pub epsilon: EpsilonSchedule,
    pub metrics: TrainingMetrics,
}

impl EpisodeRunner {
    pub fn new(config: EpisodeConfig, epsilon: EpsilonSchedule) -> Self {
        Self {
            config,
            epsilon,
            metrics: TrainingMetrics::default(),
        }
    }

    pub fn run<B, E, O>(
        &mut self,
        trainer: &mut DqnTrainer<B>,
        env: &mut E,
        optimizer: &mut O,
    ) -> Result<EpisodeOutcome>
    where
        B: AutodiffBackend,
        E: Environment,
        O: Optimizer<ActionNet<B>, B>,
    {
        trainer.clear_state();
        let mut total_reward = 0.0;
        let mut steps = 0;

        while steps < self.config.max_steps {
            let step = env.observe();
            total_reward += step.reward;
            steps += 1;

            if step.terminal {
                trainer.push_final(step.reward);
                if let Some(loss) = trainer.learn(optimizer, self.config.learn_rounds)? {
                    self.metrics.record_loss(loss);
                }
                break;
            }

            let Some(observation) = step.observation else {
                tracing::debug!("environment produced no observation, ending episode");
                break;
            };

            if let Some(loss) = trainer.learn(optimizer, self.config.learn_rounds)? {
                self.metrics.record_loss(loss);
            }

            let commands = trainer.step(observation, step.reward, self.epsilon.value())?;
            env.dispatch(&commands);
            self.epsilon.decay();
        }

        self.metrics
            .record_episode(total_reward, steps, self.epsilon.value());
        tracing::info!(
            reward = total_reward,
            steps,
            epsilon = self.epsilon.value(),
            "episode finished"
        );

        Ok(EpisodeOutcome {
            total_reward,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ActionSpec, AgentObs, DqnTrainerConfig, ObsSpec};
    use crate::env::EnvStep;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::RmsPropConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type B = Autodiff<NdArray>;

    const NAMES: [&str; 4] = ["movenorth 1", "movesouth 1", "movewest 1", "moveeast 1"];

    /// A scripted stand-in for the real world: rewards every step, ends the
    /// episode after a fixed number of rounds, and records what was
    /// dispatched.
    struct ScriptedEnv {
        obs_spec: ObsSpec,
        rounds: usize,
        seen: usize,
        dispatched: Vec<String>,
    }

    impl Environment for ScriptedEnv {
        fn observe(&mut self) -> EnvStep {
            self.seen += 1;
            if self.seen > self.rounds {
                return EnvStep {
                    observation: None,
                    reward: 100.0,
                    terminal: true,
                };
            }
            EnvStep {
                observation: Some(AgentObs::new(
                    vec![0.1 * self.seen as f32; self.obs_spec.grid_input_len()],
                    vec![0.2; self.obs_spec.target_len],
                    vec![0.3; self.obs_spec.pos_len],
                )),
                reward: -0.5,
                terminal: false,
            }
        }

        fn dispatch(&mut self, commands: &[String]) {
            self.dispatched.extend_from_slice(commands);
        }
    }

    #[test]
    fn test_episode_runs_to_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let config = DqnTrainerConfig {
            batch_size: 8,
            capacity: 64,
            memory_path: dir.path().join("memory.bin"),
            ..Default::default()
        };
        let mut trainer = DqnTrainer::<B>::new(
            config,
            ActionSpec::categorical(&NAMES),
            &Default::default(),
            StdRng::seed_from_u64(41),
        )
        .unwrap();

        let mut env = ScriptedEnv {
            obs_spec: ObsSpec::default(),
            rounds: 8,
            seen: 0,
            dispatched: Vec::new(),
        };
        let mut optimizer = RmsPropConfig::new().init::<B, ActionNet<B>>();
        let mut runner = EpisodeRunner::new(
            EpisodeConfig {
                max_steps: 50,
                learn_rounds: 1,
            },
            EpsilonSchedule::default(),
        );

        let outcome = runner.run(&mut trainer, &mut env, &mut optimizer).unwrap();

        // 8 stepped rounds plus the terminal round.
        assert_eq!(outcome.steps, 9);
        assert_eq!(env.dispatched.len(), 8);
        assert!(env.dispatched.iter().all(|c| NAMES.contains(&c.as_str())));
        // 7 chained transitions plus the terminal one.
        assert_eq!(trainer.memory().len(), 8);
        assert_eq!(
            trainer.memory().iter().filter(|t| t.next_state.is_none()).count(),
            1
        );
        assert_eq!(runner.metrics.episodes, 1);
        assert!(runner.epsilon.value() < 0.36);
    }

    #[test]
    fn test_epsilon_schedule_floors_at_end() {
        let mut schedule = EpsilonSchedule::new(0.2, 0.05, 0.5);
        schedule.decay();
        assert!((schedule.value() - 0.1).abs() < 1e-6);
        schedule.decay();
        schedule.decay();
        assert!((schedule.value() - 0.05).abs() < 1e-6);
    }
}
