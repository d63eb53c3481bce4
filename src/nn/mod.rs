//! Neural building blocks shared by the fusion and prediction modules.
//!
//! All layers hold flat row-major `Vec<f32>` parameter buffers and operate on
//! per-node feature slices. Weights use Xavier-style random initialization.

use rand::Rng;

/// Apply ReLU in place.
pub fn relu_inplace(x: &mut [f32]) {
    for v in x.iter_mut() {
        *v = v.max(0.0);
    }
}

/// Xavier-style weight initialization for an `in_dim x out_dim` matrix.
fn init_weights(in_dim: usize, out_dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    let scale = (2.0 / (in_dim + out_dim) as f32).sqrt();
    (0..in_dim * out_dim)
        .map(|_| rng.gen::<f32>() * scale - scale / 2.0)
        .collect()
}

/// Dense layer with flat row-major weights.
#[derive(Clone, Debug)]
pub struct Linear {
    /// Weights, laid out `[in_dim, out_dim]`
    pub w: Vec<f32>,
    /// Optional bias of length `out_dim`
    pub bias: Option<Vec<f32>>,
    /// Input dimension
    pub in_dim: usize,
    /// Output dimension
    pub out_dim: usize,
}

impl Linear {
    /// Create a dense layer with a zero-initialized bias.
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        Self {
            w: init_weights(in_dim, out_dim),
            bias: Some(vec![0.0; out_dim]),
            in_dim,
            out_dim,
        }
    }

    /// Create a bias-free dense layer.
    pub fn new_no_bias(in_dim: usize, out_dim: usize) -> Self {
        Self {
            w: init_weights(in_dim, out_dim),
            bias: None,
            in_dim,
            out_dim,
        }
    }

    /// Apply the layer to one feature vector.
    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        debug_assert_eq!(x.len(), self.in_dim);
        let mut out = match &self.bias {
            Some(b) => b.clone(),
            None => vec![0.0; self.out_dim],
        };
        for (j, &xv) in x.iter().enumerate() {
            let row = &self.w[j * self.out_dim..(j + 1) * self.out_dim];
            for (o, &wv) in out.iter_mut().zip(row.iter()) {
                *o += xv * wv;
            }
        }
        out
    }
}

/// Group normalization over one node's channel vector.
#[derive(Clone, Debug)]
pub struct GroupNorm {
    /// Number of channel groups
    pub num_groups: usize,
    /// Channel count
    pub dim: usize,
    /// Learnable scale per channel
    pub gamma: Vec<f32>,
    /// Learnable shift per channel
    pub beta: Vec<f32>,
}

const NORM_EPS: f32 = 1e-5;

impl GroupNorm {
    /// Create a group norm layer. `dim` must be divisible by `num_groups`.
    pub fn new(num_groups: usize, dim: usize) -> Self {
        debug_assert_eq!(dim % num_groups, 0);
        Self {
            num_groups,
            dim,
            gamma: vec![1.0; dim],
            beta: vec![0.0; dim],
        }
    }

    /// Normalize one feature vector group-wise.
    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        debug_assert_eq!(x.len(), self.dim);
        let group_size = self.dim / self.num_groups;
        let mut out = vec![0.0; self.dim];
        for g in 0..self.num_groups {
            let span = &x[g * group_size..(g + 1) * group_size];
            let mean = span.iter().sum::<f32>() / group_size as f32;
            let var =
                span.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / group_size as f32;
            let inv_std = 1.0 / (var + NORM_EPS).sqrt();
            for (k, &v) in span.iter().enumerate() {
                let c = g * group_size + k;
                out[c] = (v - mean) * inv_std * self.gamma[c] + self.beta[c];
            }
        }
        out
    }
}

/// Bias-free linear followed by group norm and an optional ReLU.
#[derive(Clone, Debug)]
pub struct NormedLinear {
    /// Dense projection (no bias; the norm's shift takes its place)
    pub linear: Linear,
    /// Channel normalization
    pub norm: GroupNorm,
    /// Whether to apply ReLU after the norm
    pub act: bool,
}

impl NormedLinear {
    /// Create a normed linear layer with a single norm group.
    pub fn new(in_dim: usize, out_dim: usize, act: bool) -> Self {
        Self {
            linear: Linear::new_no_bias(in_dim, out_dim),
            norm: GroupNorm::new(1, out_dim),
            act,
        }
    }

    /// Apply the layer to one feature vector.
    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        let mut out = self.norm.forward(&self.linear.forward(x));
        if self.act {
            relu_inplace(&mut out);
        }
        out
    }
}

/// Residual block: linear, norm, ReLU, linear, norm, plus shortcut, ReLU.
///
/// The shortcut is the identity when input and output widths match, and a
/// projected path otherwise.
#[derive(Clone, Debug)]
pub struct LinearRes {
    /// First projection
    pub linear1: Linear,
    /// First norm
    pub norm1: GroupNorm,
    /// Second projection
    pub linear2: Linear,
    /// Second norm
    pub norm2: GroupNorm,
    /// Projection shortcut when widths differ
    pub shortcut: Option<NormedLinear>,
}

impl LinearRes {
    /// Create a residual block.
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        let shortcut = if in_dim != out_dim {
            Some(NormedLinear::new(in_dim, out_dim, false))
        } else {
            None
        };
        Self {
            linear1: Linear::new_no_bias(in_dim, out_dim),
            norm1: GroupNorm::new(1, out_dim),
            linear2: Linear::new_no_bias(out_dim, out_dim),
            norm2: GroupNorm::new(1, out_dim),
            shortcut,
        }
    }

    /// Apply the block to one feature vector.
    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        let mut h = self.norm1.forward(&self.linear1.forward(x));
        relu_inplace(&mut h);
        let mut out = self.norm2.forward(&self.linear2.forward(&h));
        match &self.shortcut {
            Some(proj) => {
                let s = proj.forward(x);
                for (o, v) in out.iter_mut().zip(s.iter()) {
                    *o += v;
                }
            }
            None => {
                for (o, v) in out.iter_mut().zip(x.iter()) {
                    *o += v;
                }
            }
        }
        relu_inplace(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_shapes() {
        let layer = Linear::new(4, 3);
        let out = layer.forward(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_linear_identity() {
        let mut layer = Linear::new_no_bias(2, 2);
        layer.w = vec![1.0, 0.0, 0.0, 1.0];
        let out = layer.forward(&[3.0, -2.0]);
        assert!((out[0] - 3.0).abs() < 1e-6);
        assert!((out[1] + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_linear_bias() {
        let mut layer = Linear::new(2, 2);
        layer.w = vec![0.0; 4];
        layer.bias = Some(vec![0.5, -0.5]);
        let out = layer.forward(&[1.0, 1.0]);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_group_norm_zero_mean_unit_var() {
        let norm = GroupNorm::new(1, 4);
        let out = norm.forward(&[1.0, 2.0, 3.0, 4.0]);
        let mean: f32 = out.iter().sum::<f32>() / 4.0;
        let var: f32 = out.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_group_norm_groups_independent() {
        let norm = GroupNorm::new(2, 4);
        let out = norm.forward(&[1.0, 3.0, 10.0, 30.0]);
        // Both groups normalize to the same pattern despite different scales.
        assert!((out[0] - out[2]).abs() < 1e-4);
        assert!((out[1] - out[3]).abs() < 1e-4);
    }

    #[test]
    fn test_normed_linear_act_non_negative() {
        let layer = NormedLinear::new(8, 8, true);
        let out = layer.forward(&[0.3; 8]);
        assert_eq!(out.len(), 8);
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_linear_res_shape_and_shortcut() {
        let same = LinearRes::new(8, 8);
        assert!(same.shortcut.is_none());
        assert_eq!(same.forward(&[0.1; 8]).len(), 8);

        let proj = LinearRes::new(8, 16);
        assert!(proj.shortcut.is_some());
        assert_eq!(proj.forward(&[0.1; 8]).len(), 16);
    }
}
