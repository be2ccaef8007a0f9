//! Observation bundles and their tensor conversion.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Shape contract of the observation bundle, fixed when a network is built
/// and never renegotiated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsSpec {
    /// Number of cells in the local grid slice.
    pub grid_len: usize,
    /// Features per grid cell.
    pub grid_w: usize,
    /// Length of the target encoding (relative direction + distance).
    pub target_len: usize,
    /// Length of the self-pose encoding (orientation + fractional position).
    pub pos_len: usize,
}

impl ObsSpec {
    /// Flattened grid width fed into the grid encoder.
    pub fn grid_input_len(&self) -> usize {
        self.grid_len * self.grid_w
    }
}

impl Default for ObsSpec {
    fn default() -> Self {
        Self {
            grid_len: 9,
            grid_w: 5,
            target_len: 3,
            pos_len: 5,
        }
    }
}

/// One observation of the world: a flattened local-grid encoding, a target
/// encoding, and the agent's own pose. Stored inside replay transitions, so
/// it is kept as plain vectors and only turned into tensors at the network
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentObs {
    pub grid: Vec<f32>,
    pub target: Vec<f32>,
    pub pos: Vec<f32>,
}

impl AgentObs {
    pub fn new(grid: Vec<f32>, target: Vec<f32>, pos: Vec<f32>) -> Self {
        Self { grid, target, pos }
    }

    /// Whether this bundle matches the shape contract. Empty bundles never
    /// conform; checkpoint reload uses this to drop malformed records.
    pub fn conforms_to(&self, spec: &ObsSpec) -> bool {
        !self.grid.is_empty()
            && self.grid.len() == spec.grid_input_len()
            && self.target.len() == spec.target_len
            && self.pos.len() == spec.pos_len
    }
}

/// Stack a batch of observations into the three network input tensors
/// `(grid, target, pos)`, each `[batch_size, field_len]`. A single
/// observation is a batch of one.
pub fn stack_obs<B: Backend>(
    batch: &[&AgentObs],
    spec: &ObsSpec,
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
    let n = batch.len();

    let grid: Vec<f32> = batch.iter().flat_map(|o| o.grid.iter().copied()).collect();
    let target: Vec<f32> = batch
        .iter()
        .flat_map(|o| o.target.iter().copied())
        .collect();
    let pos: Vec<f32> = batch.iter().flat_map(|o| o.pos.iter().copied()).collect();

    (
        Tensor::<B, 1>::from_floats(grid.as_slice(), device).reshape([n, spec.grid_input_len()]),
        Tensor::<B, 1>::from_floats(target.as_slice(), device).reshape([n, spec.target_len]),
        Tensor::<B, 1>::from_floats(pos.as_slice(), device).reshape([n, spec.pos_len]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn obs(spec: &ObsSpec, fill: f32) -> AgentObs {
        AgentObs::new(
            vec![fill; spec.grid_input_len()],
            vec![fill; spec.target_len],
            vec![fill; spec.pos_len],
        )
    }

    #[test]
    fn test_conformance() {
        let spec = ObsSpec::default();
        assert!(obs(&spec, 0.5).conforms_to(&spec));

        let mut wrong = obs(&spec, 0.5);
        wrong.grid.pop();
        assert!(!wrong.conforms_to(&spec));

        let empty = AgentObs::new(vec![], vec![0.0; spec.target_len], vec![0.0; spec.pos_len]);
        assert!(!empty.conforms_to(&spec));
    }

    #[test]
    fn test_stacking_shapes() {
        let spec = ObsSpec::default();
        let a = obs(&spec, 0.1);
        let b = obs(&spec, 0.9);
        let device = Default::default();

        let (grid, target, pos) = stack_obs::<NdArray>(&[&a, &b], &spec, &device);
        assert_eq!(grid.dims(), [2, spec.grid_input_len()]);
        assert_eq!(target.dims(), [2, spec.target_len]);
        assert_eq!(pos.dims(), [2, spec.pos_len]);
    }
}
