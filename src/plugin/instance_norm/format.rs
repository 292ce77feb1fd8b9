//! Shape, dtype and format negotiation

use crate::dtype::{DType, TensorFormat};
use crate::error::{Error, Result};
use crate::ops::{InstanceNormShape, WorkspaceLayout};
use crate::tensor::{Dims, DimsExprs, TensorDesc};

/// (dtype, format) pairings the operator runs on
pub const SUPPORTED_FORMATS: [(DType, TensorFormat); 6] = [
    (DType::F32, TensorFormat::Linear),
    (DType::F16, TensorFormat::Linear),
    (DType::F32, TensorFormat::Hwc),
    (DType::F16, TensorFormat::Hwc),
    (DType::F16, TensorFormat::Hwc8),
    (DType::I8, TensorFormat::Hwc32),
];

/// Smallest accepted rank: `[N, C, W]`
pub const MIN_RANK: usize = 3;
/// Largest accepted rank: `[N, C, D, H, W]`
pub const MAX_RANK: usize = 5;

/// Whether `(dtype, format)` is on the whitelist and enabled in this build
pub fn is_supported(dtype: DType, format: TensorFormat) -> bool {
    dtype.is_enabled() && SUPPORTED_FORMATS.contains(&(dtype, format))
}

fn rank_ok(ndim: usize) -> bool {
    (MIN_RANK..=MAX_RANK).contains(&ndim)
}

/// Output shape for `output_index`: the single input's shape, symbols included
pub fn output_dimensions(output_index: usize, inputs: &[DimsExprs]) -> Result<DimsExprs> {
    if output_index != 0 {
        return Err(Error::invalid_argument(
            "output_index",
            format!("operator has one output, got index {output_index}"),
        ));
    }
    match inputs {
        [input] => Ok(input.clone()),
        _ => Err(Error::invalid_argument(
            "inputs",
            format!("expected 1 input, got {}", inputs.len()),
        )),
    }
}

/// Output element type: always the input's
pub fn output_data_type(index: usize, input_types: &[DType]) -> Result<DType> {
    if index != 0 {
        return Err(Error::invalid_argument(
            "index",
            format!("operator has one output, got index {index}"),
        ));
    }
    input_types
        .first()
        .copied()
        .ok_or_else(|| Error::invalid_argument("input_types", "no input type given"))
}

/// Whether position `pos` of `in_out` may take its proposed format
///
/// Only positions `0..=pos` are inspected; later entries may still hold
/// placeholders while the host queries combinations.
pub fn supports_format_combination(
    pos: usize,
    in_out: &[TensorDesc],
    nb_inputs: usize,
    nb_outputs: usize,
) -> bool {
    if nb_inputs != 1 || nb_outputs != 1 || pos >= nb_inputs + nb_outputs || pos >= in_out.len() {
        return false;
    }
    let candidate = &in_out[pos];
    if !is_supported(candidate.dtype, candidate.format) || !rank_ok(candidate.dims.ndim()) {
        return false;
    }
    in_out[..pos].iter().all(|prior| prior.same_format(candidate))
}

/// Concrete problem shape of a tensor description
///
/// Fails if an extent is still dynamic, the rank is out of range, the
/// channel count differs from `channels` or the tensor or workspace size
/// does not fit in `usize`.
pub fn concrete_shape(desc: &TensorDesc, channels: usize) -> Result<InstanceNormShape> {
    let dims = &desc.dims;
    if !rank_ok(dims.ndim()) {
        return Err(Error::invalid_argument(
            "dims",
            format!("rank {} outside {MIN_RANK}..={MAX_RANK}", dims.ndim()),
        ));
    }
    if !is_supported(desc.dtype, desc.format) {
        return Err(Error::UnsupportedFormat {
            dtype: desc.dtype,
            format: desc.format,
            op: "instance_norm",
        });
    }
    let extents = dims
        .to_usize()
        .ok_or_else(|| Error::invalid_argument("dims", format!("{dims:?} has dynamic extents")))?;
    check_channels(dims, channels)?;
    let spatial = extents[2..]
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            Error::invalid_argument("dims", format!("spatial extent of {dims:?} overflows usize"))
        })?;
    let shape = InstanceNormShape {
        batch: extents[0],
        channels,
        spatial,
        dtype: desc.dtype,
        format: desc.format,
    };
    shape.tensor_bytes()?;
    WorkspaceLayout::for_shape(&shape)?;
    Ok(shape)
}

/// Check the channel extent of `dims` is known and equals `channels`
pub fn check_channels(dims: &Dims, channels: usize) -> Result<()> {
    match dims.get(1) {
        Some(c) if c == channels => Ok(()),
        Some(c) => Err(Error::invalid_argument(
            "dims",
            format!("input has {c} channels, operator configured for {channels}"),
        )),
        None => Err(Error::invalid_argument(
            "dims",
            "channel dimension must be known at configure time",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DimExpr;

    fn desc(dtype: DType, format: TensorFormat) -> TensorDesc {
        TensorDesc::new([2, 4, 8, 8], dtype, format)
    }

    #[test]
    fn test_output_dims_propagate_symbols() {
        let input: DimsExprs = vec![
            DimExpr::symbol("batch"),
            DimExpr::Constant(3),
            DimExpr::Constant(16),
        ]
        .into();
        let out = output_dimensions(0, std::slice::from_ref(&input)).unwrap();
        assert_eq!(out, input);
        assert!(output_dimensions(1, &[input]).is_err());
        assert!(output_dimensions(0, &[]).is_err());
    }

    #[test]
    fn test_output_dtype_follows_input() {
        assert_eq!(output_data_type(0, &[DType::I8]).unwrap(), DType::I8);
        assert!(output_data_type(0, &[]).is_err());
        assert!(output_data_type(1, &[DType::F32]).is_err());
    }

    #[test]
    fn test_uniform_format_required() {
        let f32_hwc = desc(DType::F32, TensorFormat::Hwc);
        let f32_lin = desc(DType::F32, TensorFormat::Linear);
        assert!(supports_format_combination(0, &[f32_hwc.clone(), f32_lin.clone()], 1, 1));
        assert!(!supports_format_combination(1, &[f32_hwc.clone(), f32_lin], 1, 1));
        assert!(supports_format_combination(1, &[f32_hwc.clone(), f32_hwc], 1, 1));
    }

    #[test]
    fn test_whitelist() {
        assert!(is_supported(DType::I8, TensorFormat::Hwc32));
        assert!(!is_supported(DType::I8, TensorFormat::Linear));
        assert!(!is_supported(DType::F32, TensorFormat::Hwc8));
        assert!(!supports_format_combination(
            0,
            &[desc(DType::F32, TensorFormat::Hwc32), desc(DType::F32, TensorFormat::Hwc32)],
            1,
            1
        ));
    }

    #[test]
    fn test_rank_and_position_bounds() {
        let rank2 = TensorDesc::new([2, 4], DType::F32, TensorFormat::Linear);
        assert!(!supports_format_combination(0, &[rank2.clone(), rank2], 1, 1));
        let ok = desc(DType::F32, TensorFormat::Linear);
        assert!(!supports_format_combination(2, &[ok.clone(), ok.clone()], 1, 1));
        assert!(!supports_format_combination(0, &[ok.clone(), ok], 2, 1));
    }

    #[test]
    fn test_concrete_shape() {
        let d = TensorDesc::new([2, 3, 4, 5, 6], DType::F32, TensorFormat::Linear);
        let shape = concrete_shape(&d, 3).unwrap();
        assert_eq!((shape.batch, shape.channels, shape.spatial), (2, 3, 120));
        assert!(concrete_shape(&d, 4).is_err());
        let dynamic = TensorDesc::new([-1, 3, 4], DType::F32, TensorFormat::Linear);
        assert!(concrete_shape(&dynamic, 3).is_err());
    }

    #[test]
    fn test_concrete_shape_rejects_overflowing_extents() {
        let huge = TensorDesc::new(
            [1, 1, 1i64 << 40, 1 << 40, 1],
            DType::F32,
            TensorFormat::Linear,
        );
        let err = concrete_shape(&huge, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "dims", .. }));

        // Spatial product fits, byte size does not
        let wide = TensorDesc::new([1i64 << 20, 1, 1 << 42], DType::F32, TensorFormat::Linear);
        assert!(concrete_shape(&wide, 1).is_err());
    }
}
