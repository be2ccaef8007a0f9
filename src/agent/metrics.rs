//! Training metrics for the environment-stepping loop.

use std::collections::VecDeque;
use std::time::Instant;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rolling view of training progress across episodes.
#[derive(Debug)]
pub struct TrainingMetrics {
    /// Cumulative reward per episode
    pub episode_rewards: MovingAverage,
    /// Steps per episode
    pub episode_lengths: MovingAverage,
    /// TD loss
    pub loss: MovingAverage,
    /// Episodes completed
    pub episodes: usize,
    /// Environment steps across all episodes
    pub total_steps: usize,
    /// Exploration rate at the end of the last episode
    pub epsilon: f32,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: MovingAverage::new(window_size),
            episode_lengths: MovingAverage::new(window_size),
            loss: MovingAverage::new(window_size),
            episodes: 0,
            total_steps: 0,
            epsilon: 0.0,
            start_time: Instant::now(),
        }
    }

    pub fn record_episode(&mut self, reward: f32, steps: usize, epsilon: f32) {
        self.episode_rewards.push(reward);
        self.episode_lengths.push(steps as f32);
        self.episodes += 1;
        self.total_steps += steps;
        self.epsilon = epsilon;
    }

    pub fn record_loss(&mut self, loss: f32) {
        self.loss.push(loss);
    }

    pub fn steps_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_steps as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn log_to_console(&self) {
        tracing::info!(
            "Episode {} | Steps {} | SPS {:.1}",
            self.episodes,
            self.total_steps,
            self.steps_per_second()
        );
        tracing::info!(
            "  reward={:.2}, length={:.1}, loss={:.4}, epsilon={:.3}",
            self.episode_rewards.average(),
            self.episode_lengths.average(),
            self.loss.average(),
            self.epsilon
        );
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}
