//! Operator lifecycle: initialize/terminate, attach/detach, clone, errors

#![cfg(feature = "cpu")]

mod common;

use common::{create_cpu_client, linear_desc, prepare, ready_plugin, run_forward};
use instnorm::dtype::DType;
use instnorm::error::{Error, ErrorKind, status_of};
use instnorm::plugin::{AuxHandle, DynamicPlugin, InstanceNormalizationPlugin};
use instnorm::runtime::cpu::{CpuDevice, CpuRuntime};
use instnorm::runtime::{DeviceBuffer, RuntimeClient};
use instnorm::tensor::{DynamicTensorDesc, TensorDesc};
use std::sync::Arc;

fn plugin_on(device: &CpuDevice, channels: usize) -> InstanceNormalizationPlugin<CpuRuntime> {
    InstanceNormalizationPlugin::<CpuRuntime>::new(
        1e-5,
        vec![1.0; channels],
        vec![0.0; channels],
        false,
        0.0,
    )
    .unwrap()
    .with_device(device.clone())
}

#[test]
fn test_initialize_is_idempotent_and_terminate_repeatable() {
    let device = CpuDevice::new();
    let mut plugin = plugin_on(&device, 4);
    assert!(!plugin.is_initialized());

    plugin.initialize().unwrap();
    assert_eq!(device.bytes_in_use(), 32);
    plugin.initialize().unwrap();
    assert_eq!(device.bytes_in_use(), 32);

    plugin.terminate();
    assert!(!plugin.is_initialized());
    assert_eq!(device.bytes_in_use(), 0);
    plugin.terminate();
    assert_eq!(device.bytes_in_use(), 0);
}

#[test]
fn test_drop_releases_device_parameters() {
    let device = CpuDevice::new();
    {
        let mut plugin = plugin_on(&device, 3);
        plugin.initialize().unwrap();
        assert_eq!(device.bytes_in_use(), 24);
    }
    assert_eq!(device.bytes_in_use(), 0);
}

#[test]
fn test_initialize_out_of_memory_leaves_nothing_behind() {
    // Room for the scale buffer but not the bias buffer
    let device = CpuDevice::with_memory_limit(20);
    let mut plugin = plugin_on(&device, 4);

    let err = plugin.initialize().unwrap_err();
    assert!(matches!(err, Error::OutOfMemory { .. }));
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(!plugin.is_initialized());
    assert_eq!(device.bytes_in_use(), 0);
}

#[test]
fn test_enqueue_requires_full_lifecycle() {
    let (client, _device) = create_cpu_client();
    let desc = linear_desc(&[1, 2, 4], DType::F32);
    let input = [0.0f32; 8];
    let fixed = DynamicTensorDesc::fixed(desc.clone());

    let mut plugin = plugin_on(client.device(), 2);
    let err = run_forward(&mut plugin, &client, &desc, &input).unwrap_err();
    assert!(matches!(err, Error::InvalidState { op: "enqueue", .. }));

    plugin.initialize().unwrap();
    let err = run_forward(&mut plugin, &client, &desc, &input).unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "unconfigured: {err}");

    plugin
        .configure_plugin(std::slice::from_ref(&fixed), std::slice::from_ref(&fixed))
        .unwrap();
    let err = run_forward(&mut plugin, &client, &desc, &input).unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "detached: {err}");

    plugin.attach_to_context(&client, None, None);
    run_forward(&mut plugin, &client, &desc, &input).unwrap();

    plugin.detach_from_context();
    assert!(!plugin.is_attached());
    assert!(run_forward(&mut plugin, &client, &desc, &input).is_err());
}

#[test]
fn test_attach_records_handles_without_owning_them() {
    let (client, device) = create_cpu_client();
    let allocator = Arc::new(client.allocator().clone());
    let mut plugin = plugin_on(&device, 1);

    plugin.attach_to_context(&client, Some(AuxHandle(0xfeed)), Some(&allocator));
    assert_eq!(plugin.aux_handle(), Some(AuxHandle(0xfeed)));
    assert!(plugin.bound_allocator().is_some());
    assert_eq!(Arc::strong_count(&client), 1);
    assert_eq!(Arc::strong_count(&allocator), 1);

    drop(allocator);
    assert!(plugin.bound_allocator().is_none());

    plugin.detach_from_context();
    assert_eq!(plugin.aux_handle(), None);
    // A second detach is tolerated
    plugin.detach_from_context();
}

#[test]
fn test_enqueue_after_context_dropped_fails() {
    let (client, _device) = create_cpu_client();
    let desc = linear_desc(&[1, 1, 4], DType::F32);
    let mut plugin = ready_plugin(&client, &desc, 1e-5, vec![1.0], vec![0.0], false, 0.0);

    let other = Arc::new(instnorm::runtime::cpu::CpuClient::new(client.device().clone()));
    plugin.attach_to_context(&other, None, None);
    drop(other);

    let err = run_forward(&mut plugin, &client, &desc, &[1.0f32, 2.0, 3.0, 4.0]).unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[test]
fn test_clone_is_independent() {
    let (client, device) = create_cpu_client();
    let desc = linear_desc(&[1, 2, 4], DType::F32);
    let mut original =
        ready_plugin(&client, &desc, 1e-5, vec![1.0, 2.0], vec![0.0, 1.0], false, 0.0);
    original.set_plugin_namespace("ns");
    let before = device.bytes_in_use();

    let mut copy = original.clone_plugin().unwrap();
    assert_eq!(copy.plugin_namespace(), "ns");
    // The copy owns its own parameters
    assert_eq!(device.bytes_in_use(), 2 * before);

    original.terminate();
    drop(original);
    assert_eq!(device.bytes_in_use(), before);

    let input = [1.0f32, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0];
    let fixed = DynamicTensorDesc::fixed(desc.clone());
    copy.configure_plugin(std::slice::from_ref(&fixed), std::slice::from_ref(&fixed))
        .unwrap();
    copy.attach_to_context(&client, None, None);
    let out = run_forward(copy.as_mut(), &client, &desc, &input).unwrap();
    assert!((out[3] - 1.3416).abs() < 1e-4);
    assert_eq!(&out[4..], &[1.0; 4]);
}

#[test]
fn test_clone_of_uninitialized_stays_uninitialized() {
    let device = CpuDevice::new();
    let plugin = plugin_on(&device, 2);
    let copy = plugin.clone_plugin().unwrap();
    assert_eq!(device.bytes_in_use(), 0);
    assert_eq!(copy.serialization_size(), plugin.serialization_size());
}

#[test]
fn test_enqueue_rejects_short_buffers() {
    let (client, device) = create_cpu_client();
    let desc = linear_desc(&[2, 2, 4], DType::F32);
    let mut plugin = ready_plugin(&client, &desc, 1e-5, vec![1.0, 1.0], vec![0.0, 0.0], false, 0.0);

    let x = DeviceBuffer::<CpuRuntime>::from_slice(&[0.0f32; 16], &device).unwrap();
    let mut y = DeviceBuffer::<CpuRuntime>::new(16 * 4, &device).unwrap();
    let mut ws = DeviceBuffer::<CpuRuntime>::new(8, &device).unwrap();
    let descs = std::slice::from_ref(&desc);

    let result = plugin.enqueue(
        descs,
        descs,
        &[x.as_slice()],
        &mut [y.as_slice_mut()],
        &mut ws.as_slice_mut(),
        client.stream(),
    );
    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "workspace", .. }));
    assert_eq!(status_of(&result), ErrorKind::InvalidArgument.status_code());
}

#[test]
fn test_enqueue_rejects_mismatched_output_desc() {
    let (client, _device) = create_cpu_client();
    let desc = linear_desc(&[1, 2, 4], DType::F32);
    let mut plugin = ready_plugin(&client, &desc, 1e-5, vec![1.0, 1.0], vec![0.0, 0.0], false, 0.0);

    let device = client.device();
    let x = DeviceBuffer::<CpuRuntime>::from_slice(&[0.0f32; 8], device).unwrap();
    let mut y = DeviceBuffer::<CpuRuntime>::new(32, device).unwrap();
    let mut ws = DeviceBuffer::<CpuRuntime>::new(4096, device).unwrap();
    let wrong = linear_desc(&[1, 2, 2, 2], DType::F32);

    let err = plugin
        .enqueue(
            &[desc],
            &[wrong],
            &[x.as_slice()],
            &mut [y.as_slice_mut()],
            &mut ws.as_slice_mut(),
            client.stream(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "outputs", .. }));
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let (client, _device) = create_cpu_client();
    let desc = linear_desc(&[0, 2, 4], DType::F32);
    let mut plugin = plugin_on(client.device(), 2);
    prepare(&mut plugin, &client, &desc).unwrap();
    let out = run_forward::<f32>(&mut plugin, &client, &desc, &[]).unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_configure_rejects_bad_negotiation() {
    let mut plugin = plugin_on(&CpuDevice::new(), 3);
    let good = DynamicTensorDesc::fixed(linear_desc(&[1, 3, 8], DType::F32));

    let wrong_channels = DynamicTensorDesc::fixed(linear_desc(&[1, 4, 8], DType::F32));
    let err = plugin
        .configure_plugin(
            std::slice::from_ref(&wrong_channels),
            std::slice::from_ref(&wrong_channels),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mixed = DynamicTensorDesc::fixed(linear_desc(&[1, 3, 8], DType::F16));
    assert!(
        plugin
            .configure_plugin(std::slice::from_ref(&good), std::slice::from_ref(&mixed))
            .is_err()
    );

    let int8_linear = DynamicTensorDesc::fixed(linear_desc(&[1, 3, 8], DType::I8));
    let err = plugin
        .configure_plugin(std::slice::from_ref(&int8_linear), std::slice::from_ref(&int8_linear))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

    assert!(plugin.configure_plugin(&[good.clone(), good.clone()], &[good]).is_err());
    assert!(plugin.precision_scales().is_none());
}

#[test]
fn test_int8_configure_requires_positive_scales() {
    let mut plugin = plugin_on(&CpuDevice::new(), 2);
    let desc = TensorDesc::new(
        [1, 2, 4, 4],
        DType::I8,
        instnorm::dtype::TensorFormat::Hwc32,
    );
    let zero = DynamicTensorDesc::fixed(desc.clone().with_scale(0.0));
    assert!(
        plugin
            .configure_plugin(std::slice::from_ref(&zero), std::slice::from_ref(&zero))
            .is_err()
    );

    let ok = DynamicTensorDesc::fixed(desc.with_scale(0.25));
    plugin
        .configure_plugin(std::slice::from_ref(&ok), std::slice::from_ref(&ok))
        .unwrap();
    let scales = plugin.precision_scales().unwrap();
    assert_eq!((scales.input, scales.output), (0.25, 0.25));
}

#[test]
fn test_float_configure_uses_identity_scales() {
    let mut plugin = plugin_on(&CpuDevice::new(), 2);
    let desc = DynamicTensorDesc::fixed(linear_desc(&[1, 2, 4], DType::F32).with_scale(7.0));
    plugin
        .configure_plugin(std::slice::from_ref(&desc), std::slice::from_ref(&desc))
        .unwrap();
    let scales = plugin.precision_scales().unwrap();
    assert_eq!((scales.input, scales.output), (1.0, 1.0));
}
