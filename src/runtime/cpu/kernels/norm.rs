//! Instance normalization kernels

use crate::dtype::Element;
use crate::ops::{Activation, InstanceNormParams, InstanceNormShape};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Per-instance f32 scratch segments carved out of the workspace
///
/// Every segment holds `batch * channels` entries, indexed `n * C + c`.
pub struct StatsScratch<'a> {
    /// Scale replicated per sample
    pub scale: &'a mut [f32],
    /// Bias replicated per sample
    pub bias: &'a mut [f32],
    /// Per-instance mean
    pub mean: &'a mut [f32],
    /// Per-instance `1 / sqrt(variance + eps)`
    pub inv_std: &'a mut [f32],
}

/// Instance Normalization:
/// `output = act((x - mean) / sqrt(variance + eps) * scale[c] + bias[c])`
///
/// Mean and biased variance are taken over the spatial extent of each
/// (sample, channel) slice and accumulated in f64. `i8` inputs are
/// multiplied by `params.input_scale` on load and outputs divided by
/// `params.output_scale` before narrowing; other types ignore both.
///
/// # Arguments
/// * `input` - Input data, `batch * sample_elems` elements
/// * `output` - Output data, same size as `input`; channel padding is not written
/// * `scale` - Per-channel scale, `shape.channels` entries
/// * `bias` - Per-channel bias, `shape.channels` entries
/// * `scratch` - Workspace segments, `batch * channels` entries each
pub fn instance_norm_kernel<T: Element>(
    input: &[T],
    output: &mut [T],
    scale: &[f32],
    bias: &[f32],
    scratch: StatsScratch<'_>,
    shape: &InstanceNormShape,
    params: &InstanceNormParams,
) {
    let channels = shape.channels;
    if shape.batch == 0 || channels == 0 || shape.spatial == 0 {
        return;
    }
    // Sizes were checked by the caller
    let sample_len = shape.format.padded_channels(channels) * shape.spatial;
    let (in_scale, out_scale) = params.quantization(T::DTYPE);

    let StatsScratch {
        scale: scale_rep,
        bias: bias_rep,
        mean,
        inv_std,
    } = scratch;

    // Expand per-channel parameters to per-instance parameters
    for (s, b) in scale_rep
        .chunks_mut(channels)
        .zip(bias_rep.chunks_mut(channels))
    {
        s.copy_from_slice(scale);
        b.copy_from_slice(bias);
    }

    // Pass 1: statistics
    #[cfg(feature = "rayon")]
    {
        input
            .par_chunks(sample_len)
            .zip(mean.par_chunks_mut(channels))
            .zip(inv_std.par_chunks_mut(channels))
            .for_each(|((x, m), r)| sample_statistics(x, m, r, shape, params.epsilon, in_scale));
    }
    #[cfg(not(feature = "rayon"))]
    {
        input
            .chunks(sample_len)
            .zip(mean.chunks_mut(channels))
            .zip(inv_std.chunks_mut(channels))
            .for_each(|((x, m), r)| sample_statistics(x, m, r, shape, params.epsilon, in_scale));
    }

    // Pass 2: normalize, affine, activation
    let mean: &[f32] = mean;
    let inv_std: &[f32] = inv_std;
    let scale_rep: &[f32] = scale_rep;
    let bias_rep: &[f32] = bias_rep;
    let normalize = |(n, y): (usize, &mut [T])| {
        let x = &input[n * sample_len..(n + 1) * sample_len];
        let inst = n * channels..(n + 1) * channels;
        normalize_sample(
            x,
            y,
            &mean[inst.clone()],
            &inv_std[inst.clone()],
            &scale_rep[inst.clone()],
            &bias_rep[inst],
            shape,
            params.activation,
            (in_scale, out_scale),
        );
    };

    #[cfg(feature = "rayon")]
    output
        .par_chunks_mut(sample_len)
        .enumerate()
        .for_each(normalize);
    #[cfg(not(feature = "rayon"))]
    output.chunks_mut(sample_len).enumerate().for_each(normalize);
}

/// Mean and inverse standard deviation of every channel of one sample
fn sample_statistics<T: Element>(
    x: &[T],
    mean: &mut [f32],
    inv_std: &mut [f32],
    shape: &InstanceNormShape,
    epsilon: f32,
    in_scale: f32,
) {
    let in_scale = in_scale as f64;
    let count = shape.spatial as f64;
    let eps = epsilon as f64;

    for c in 0..shape.channels {
        let load = |s: usize| x[shape.offset_in_sample(c, s)].to_f32() as f64 * in_scale;

        let mut sum = 0.0f64;
        for s in 0..shape.spatial {
            sum += load(s);
        }
        let m = sum / count;

        let mut var_sum = 0.0f64;
        for s in 0..shape.spatial {
            let diff = load(s) - m;
            var_sum += diff * diff;
        }
        let variance = var_sum / count;

        mean[c] = m as f32;
        inv_std[c] = (1.0 / (variance + eps).sqrt()) as f32;
    }
}

#[allow(clippy::too_many_arguments)]
fn normalize_sample<T: Element>(
    x: &[T],
    y: &mut [T],
    mean: &[f32],
    inv_std: &[f32],
    scale: &[f32],
    bias: &[f32],
    shape: &InstanceNormShape,
    activation: Activation,
    (in_scale, out_scale): (f32, f32),
) {
    let out_mul = 1.0 / out_scale;
    for c in 0..shape.channels {
        for s in 0..shape.spatial {
            let i = shape.offset_in_sample(c, s);
            let v = x[i].to_f32() * in_scale;
            let normalized = (v - mean[c]) * inv_std[c];
            let affine = normalized * scale[c] + bias[c];
            let activated = activation.apply(affine);
            y[i] = T::from_f32(activated * out_mul);
        }
    }
}
