//! Integration tests for CPU runtime
//!
//! These tests verify the public API of the CPU runtime implementation.

#![cfg(feature = "cpu")]

use instnorm::error::Error;
use instnorm::runtime::cpu::{CpuDevice, CpuRuntime};
use instnorm::runtime::{Allocator, DeviceBuffer, Runtime, RuntimeClient, Stream};

#[test]
fn test_allocate_deallocate() {
    let device = CpuDevice::new();
    let ptr = CpuRuntime::allocate(1024, &device).unwrap();
    assert_ne!(ptr, 0);
    assert_eq!(ptr % 64, 0);
    assert_eq!(device.bytes_in_use(), 1024);
    CpuRuntime::deallocate(ptr, 1024, &device);
    assert_eq!(device.bytes_in_use(), 0);
}

#[test]
fn test_zero_sized_allocation() {
    let device = CpuDevice::new();
    let ptr = CpuRuntime::allocate(0, &device).unwrap();
    assert_eq!(ptr, 0);
    CpuRuntime::deallocate(ptr, 0, &device);
}

#[test]
fn test_copy_roundtrip() {
    let device = CpuDevice::new();
    let data: Vec<u8> = vec![1, 2, 3, 4, 5, 6, 7, 8];

    let ptr = CpuRuntime::allocate(data.len(), &device).unwrap();
    CpuRuntime::copy_to_device(&data, ptr, &device).unwrap();

    let mut result = vec![0u8; data.len()];
    CpuRuntime::copy_from_device(ptr, &mut result, &device).unwrap();

    assert_eq!(data, result);

    CpuRuntime::deallocate(ptr, data.len(), &device);
}

#[test]
fn test_null_pointer_copies_fail() {
    let device = CpuDevice::new();
    assert!(CpuRuntime::copy_to_device(&[1, 2], 0, &device).is_err());
    assert!(CpuRuntime::copy_from_device(0, &mut [0u8; 2], &device).is_err());
}

#[test]
fn test_memory_limit_reports_out_of_memory() {
    let device = CpuDevice::with_memory_limit(100);
    let a = DeviceBuffer::<CpuRuntime>::new(80, &device).unwrap();
    let err = DeviceBuffer::<CpuRuntime>::new(40, &device).unwrap_err();
    assert!(matches!(err, Error::OutOfMemory { size: 40 }));
    drop(a);
    assert!(DeviceBuffer::<CpuRuntime>::new(40, &device).is_ok());
}

#[test]
fn test_client_allocator_and_stream() {
    let device = CpuDevice::new();
    let client = CpuRuntime::default_client(&device).unwrap();
    let allocator = client.allocator();

    let ptr = allocator.allocate(256).unwrap();
    assert_eq!(allocator.allocated_bytes(), 256);
    allocator.deallocate(ptr, 256);
    assert_eq!(allocator.allocated_bytes(), 0);

    client.stream().synchronize().unwrap();
    client.synchronize().unwrap();
    assert_eq!(CpuRuntime::name(), "cpu");
}
