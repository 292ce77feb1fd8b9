//! Common test utilities
#![allow(dead_code)]

use instnorm::dtype::{DType, Element, TensorFormat};
use instnorm::error::Result;
use instnorm::plugin::{DynamicPlugin, InstanceNormalizationPlugin};
use instnorm::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
use instnorm::runtime::{DeviceBuffer, DeviceSliceMut, Runtime, RuntimeClient};
use instnorm::tensor::{DynamicTensorDesc, TensorDesc};
use std::sync::Arc;

/// Bytes of sentinel placed on each side of a guarded buffer
pub const GUARD: usize = 256;
/// Sentinel byte value
pub const SENTINEL: u8 = 0xA5;

/// Route crate logs to the test harness; `RUST_LOG` picks the level
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // Another test in this binary may have installed it already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Create a CPU client and device for testing
pub fn create_cpu_client() -> (Arc<CpuClient>, CpuDevice) {
    init_tracing();
    let device = CpuDevice::new();
    let client = CpuRuntime::default_client(&device).expect("cpu client");
    (Arc::new(client), device)
}

/// Assert two f32 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Reference forward pass over a linear `[n, c, spatial]` tensor, accumulated in f64
pub fn reference_instance_norm(
    input: &[f32],
    n: usize,
    c: usize,
    spatial: usize,
    epsilon: f32,
    scale: &[f32],
    bias: &[f32],
    slope: Option<f32>,
) -> Vec<f32> {
    let mut out = vec![0.0f32; input.len()];
    for i in 0..n * c {
        let ch = i % c;
        let slice = &input[i * spatial..(i + 1) * spatial];
        let mean = slice.iter().map(|&v| v as f64).sum::<f64>() / spatial as f64;
        let var = slice
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / spatial as f64;
        let inv_std = 1.0 / (var + epsilon as f64).sqrt();
        for (s, &v) in slice.iter().enumerate() {
            let mut y = (v as f64 - mean) * inv_std * scale[ch] as f64 + bias[ch] as f64;
            if let Some(alpha) = slope {
                if y < 0.0 {
                    y *= alpha as f64;
                }
            }
            out[i * spatial + s] = y as f32;
        }
    }
    out
}

/// Deterministic pseudo-random values in `[-4, 4)`
pub fn sample_values(len: usize, seed: u64) -> Vec<f32> {
    use rand::{Rng, SeedableRng, rngs::StdRng};
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-4.0f32..4.0)).collect()
}

/// Descriptor with a linear layout
pub fn linear_desc(dims: &[usize], dtype: DType) -> TensorDesc {
    TensorDesc::new(
        dims.iter().map(|&d| d as i64).collect::<Vec<_>>(),
        dtype,
        TensorFormat::Linear,
    )
}

/// Bytes of a tensor described by `desc` (channel padding included)
pub fn storage_bytes(desc: &TensorDesc) -> usize {
    let dims = desc.dims.to_usize().expect("concrete dims");
    let spatial: usize = dims[2..].iter().product();
    desc.format.storage_elems(dims[0], dims[1], spatial) * desc.dtype.size_in_bytes()
}

/// Configure (fixed shape), initialize and attach `plugin` for `desc`
pub fn prepare(
    plugin: &mut dyn DynamicPlugin<CpuRuntime>,
    client: &Arc<CpuClient>,
    desc: &TensorDesc,
) -> Result<()> {
    let fixed = DynamicTensorDesc::fixed(desc.clone());
    plugin.configure_plugin(std::slice::from_ref(&fixed), std::slice::from_ref(&fixed))?;
    plugin.initialize()?;
    plugin.attach_to_context(client, None, None);
    Ok(())
}

/// Build, prepare and return an f32/linear plugin
pub fn ready_plugin(
    client: &Arc<CpuClient>,
    desc: &TensorDesc,
    epsilon: f32,
    scale: Vec<f32>,
    bias: Vec<f32>,
    relu: bool,
    alpha: f32,
) -> InstanceNormalizationPlugin<CpuRuntime> {
    let mut plugin =
        InstanceNormalizationPlugin::<CpuRuntime>::new(epsilon, scale, bias, relu, alpha)
            .expect("valid config")
            .with_device(client.device().clone());
    prepare(&mut plugin, client, desc).expect("prepare");
    plugin
}

/// Run one forward pass of `plugin` on `input` (raw storage of `desc`)
pub fn run_forward<T: Element>(
    plugin: &mut dyn DynamicPlugin<CpuRuntime>,
    client: &Arc<CpuClient>,
    desc: &TensorDesc,
    input: &[T],
) -> Result<Vec<T>> {
    let device = client.device();
    let x = DeviceBuffer::<CpuRuntime>::from_slice(input, device)?;
    let mut y = DeviceBuffer::<CpuRuntime>::new(storage_bytes(desc), device)?;
    let descs = std::slice::from_ref(desc);
    let ws_bytes = plugin.workspace_size(descs, descs)?;
    let mut ws = DeviceBuffer::<CpuRuntime>::new(ws_bytes, device)?;

    plugin.enqueue(
        descs,
        descs,
        &[x.as_slice()],
        &mut [y.as_slice_mut()],
        &mut ws.as_slice_mut(),
        client.stream(),
    )?;
    client.synchronize()?;
    y.to_vec::<T>()
}

/// Device buffer surrounded by sentinel bytes
pub struct GuardedBuffer {
    buffer: DeviceBuffer<CpuRuntime>,
    len: usize,
}

impl GuardedBuffer {
    /// Allocate `len` usable bytes with [`GUARD`] sentinel bytes on each side
    pub fn new(len: usize, device: &CpuDevice) -> Self {
        let total = len + 2 * GUARD;
        let buffer = DeviceBuffer::<CpuRuntime>::new(total, device).expect("guarded alloc");
        CpuRuntime::copy_to_device(&vec![SENTINEL; total], buffer.ptr(), device)
            .expect("fill sentinel");
        Self { buffer, len }
    }

    /// Mutable view of the usable region
    pub fn view(&self) -> DeviceSliceMut {
        unsafe { DeviceSliceMut::from_raw(self.buffer.ptr() + GUARD as u64, self.len) }
    }

    /// Whether both sentinel regions still hold [`SENTINEL`]
    pub fn guards_intact(&self) -> bool {
        let bytes = self.raw();
        let (head, rest) = bytes.split_at(GUARD);
        let tail = &rest[self.len..];
        head.iter().chain(tail).all(|&b| b == SENTINEL)
    }

    /// Copy of the usable region
    pub fn contents(&self) -> Vec<u8> {
        let bytes = self.raw();
        bytes[GUARD..GUARD + self.len].to_vec()
    }

    fn raw(&self) -> Vec<u8> {
        let bytes = self.buffer.to_vec::<i8>().expect("read back");
        bytes.into_iter().map(|b| b as u8).collect()
    }
}
