//! Shared encoder/trunk/head network and target-blending helpers.

use burn::module::Module;
use burn::nn::{Initializer, LeakyRelu, LeakyReluConfig, Linear, LinearConfig};
use burn::prelude::*;

use super::observation::ObsSpec;

/// Configuration for the shared network body.
#[derive(Debug, Clone)]
pub struct ActionNetConfig {
    /// Observation shape contract.
    pub obs: ObsSpec,
    /// Width of every hidden layer.
    pub hidden_size: usize,
    /// Width the grid encoder compresses the local grid down to.
    pub grid_features: usize,
}

impl Default for ActionNetConfig {
    fn default() -> Self {
        Self {
            obs: ObsSpec::default(),
            hidden_size: 256,
            grid_features: 20,
        }
    }
}

impl ActionNetConfig {
    /// Build the network with an output head of `out_width` parameters.
    pub fn init<B: Backend>(&self, out_width: usize, device: &B::Device) -> ActionNet<B> {
        let grid_enc = vec![
            linear(self.obs.grid_input_len(), self.hidden_size, device),
            linear(self.hidden_size, self.grid_features, device),
        ];

        let trunk_input = self.grid_features + self.obs.target_len + self.obs.pos_len;
        let trunk = vec![
            linear(trunk_input, self.hidden_size, device),
            linear(self.hidden_size, self.hidden_size, device),
            linear(self.hidden_size, self.hidden_size, device),
        ];

        let head = vec![
            linear(self.hidden_size, self.hidden_size, device),
            linear(self.hidden_size, self.hidden_size, device),
            linear(self.hidden_size, self.hidden_size, device),
            linear(self.hidden_size, out_width, device),
        ];

        ActionNet {
            grid_enc,
            trunk,
            head,
            activation: LeakyReluConfig::new().init(),
        }
    }
}

fn linear<B: Backend>(input: usize, output: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(input, output)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device)
}

/// The network body shared by the stochastic sampler and the Q-value view:
/// a small grid encoder, a feed-forward trunk over the concatenated
/// encodings, and an output head producing one flat parameter vector per
/// batch row. The head output is raw; any squashing belongs to the caller.
#[derive(Module, Debug)]
pub struct ActionNet<B: Backend> {
    grid_enc: Vec<Linear<B>>,
    trunk: Vec<Linear<B>>,
    head: Vec<Linear<B>>,
    activation: LeakyRelu,
}

impl<B: Backend> ActionNet<B> {
    /// Forward pass over a stacked batch: `(grid, target, pos)` each
    /// `[batch, field_len]`, returning `[batch, out_width]`.
    pub fn forward(
        &self,
        grid: Tensor<B, 2>,
        target: Tensor<B, 2>,
        pos: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let mut g = grid;
        for layer in &self.grid_enc {
            g = self.activation.forward(layer.forward(g));
        }

        let mut x = Tensor::cat(vec![g, target, pos], 1);
        for layer in &self.trunk {
            x = self.activation.forward(layer.forward(x));
        }

        let last = self.head.len() - 1;
        for (i, layer) in self.head.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.activation.forward(x);
            }
        }
        x
    }

    /// Blend every parameter toward `policy`:
    /// `param ← tau·policy + (1−tau)·param`.
    pub fn blend(target: Self, policy: &Self, tau: f32) -> Self {
        let zip = |t: Vec<Linear<B>>, p: &[Linear<B>]| -> Vec<Linear<B>> {
            t.into_iter()
                .zip(p.iter())
                .map(|(t, p)| blend_linear(t, p, tau))
                .collect()
        };

        Self {
            grid_enc: zip(target.grid_enc, &policy.grid_enc),
            trunk: zip(target.trunk, &policy.trunk),
            head: zip(target.head, &policy.head),
            activation: target.activation,
        }
    }
}

/// Convex blend of one layer pair, weight and bias alike.
pub(crate) fn blend_linear<B: Backend>(
    target: Linear<B>,
    policy: &Linear<B>,
    tau: f32,
) -> Linear<B> {
    let pw = policy.weight.val();
    let weight = target
        .weight
        .map(|w| (pw * tau + w * (1.0 - tau)).detach());

    let bias = match (target.bias, policy.bias.as_ref()) {
        (Some(tb), Some(pb)) => {
            let pb = pb.val();
            Some(tb.map(|b| (pb * tau + b * (1.0 - tau)).detach()))
        }
        (other, _) => other,
    };

    Linear { weight, bias }
}
