//! Serialized operator state
//!
//! Little-endian, fixed order:
//!
//! ```text
//! epsilon  f32
//! channels i32
//! relu     i32   (0 or 1)
//! alpha    f32
//! scale    f32 x channels
//! bias     f32 x channels
//! ```

use super::params::InstanceNormConfig;
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Bytes before the per-channel arrays
pub const HEADER_SIZE: usize = 16;

/// Exact serialized size for `channels` channels
pub fn serialized_size(channels: usize) -> usize {
    HEADER_SIZE + 2 * channels * std::mem::size_of::<f32>()
}

/// Write `config` into the front of `buffer`
pub fn encode(config: &InstanceNormConfig, buffer: &mut [u8]) -> Result<()> {
    let size = serialized_size(config.channels());
    if buffer.len() < size {
        return Err(Error::invalid_argument(
            "buffer",
            format!("{} bytes, serialized state needs {size}", buffer.len()),
        ));
    }

    let got = buffer.len();
    let overflow = |_: std::io::Error| Error::Malformed {
        expected: size,
        got,
    };
    let channels = i32::try_from(config.channels()).map_err(|_| {
        Error::invalid_argument("channels", "channel count exceeds i32 range")
    })?;
    let mut cursor = Cursor::new(&mut buffer[..size]);
    cursor.write_f32::<LittleEndian>(config.epsilon()).map_err(overflow)?;
    cursor.write_i32::<LittleEndian>(channels).map_err(overflow)?;
    cursor
        .write_i32::<LittleEndian>(i32::from(config.relu()))
        .map_err(overflow)?;
    cursor.write_f32::<LittleEndian>(config.alpha()).map_err(overflow)?;
    for &v in config.scale().iter().chain(config.bias()) {
        cursor.write_f32::<LittleEndian>(v).map_err(overflow)?;
    }
    Ok(())
}

/// Rebuild a configuration from exactly one serialized state
pub fn decode(bytes: &[u8]) -> Result<InstanceNormConfig> {
    let got = bytes.len();
    let truncated = |expected: usize| move |_: std::io::Error| Error::Malformed { expected, got };

    let mut cursor = Cursor::new(bytes);
    let epsilon = cursor
        .read_f32::<LittleEndian>()
        .map_err(truncated(HEADER_SIZE))?;
    let channels = cursor
        .read_i32::<LittleEndian>()
        .map_err(truncated(HEADER_SIZE))?;
    let relu = cursor
        .read_i32::<LittleEndian>()
        .map_err(truncated(HEADER_SIZE))?;
    let alpha = cursor
        .read_f32::<LittleEndian>()
        .map_err(truncated(HEADER_SIZE))?;

    let channels = usize::try_from(channels)
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| {
            Error::invalid_argument(
                "channels",
                format!("serialized channel count {channels} is not positive"),
            )
        })?;
    let expected = HEADER_SIZE.saturating_add(channels.saturating_mul(8));
    if got != expected {
        return Err(Error::Malformed { expected, got });
    }

    let mut scale = vec![0.0f32; channels];
    let mut bias = vec![0.0f32; channels];
    cursor
        .read_f32_into::<LittleEndian>(&mut scale)
        .map_err(truncated(expected))?;
    cursor
        .read_f32_into::<LittleEndian>(&mut bias)
        .map_err(truncated(expected))?;

    InstanceNormConfig::new(epsilon, scale, bias, relu != 0, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InstanceNormConfig {
        InstanceNormConfig::new(1e-5, vec![1.0, 2.0], vec![0.0, 1.0], true, 0.1).unwrap()
    }

    #[test]
    fn test_layout() {
        let cfg = config();
        let mut buf = vec![0u8; serialized_size(2)];
        assert_eq!(buf.len(), 32);
        encode(&cfg, &mut buf).unwrap();
        assert_eq!(&buf[0..4], &1e-5f32.to_le_bytes());
        assert_eq!(&buf[4..8], &2i32.to_le_bytes());
        assert_eq!(&buf[8..12], &1i32.to_le_bytes());
        assert_eq!(&buf[12..16], &0.1f32.to_le_bytes());
        assert_eq!(&buf[16..20], &1.0f32.to_le_bytes());
        assert_eq!(&buf[28..32], &1.0f32.to_le_bytes());
        assert_eq!(decode(&buf).unwrap(), cfg);
    }

    #[test]
    fn test_length_mismatch_is_malformed() {
        let mut buf = vec![0u8; serialized_size(2)];
        encode(&config(), &mut buf).unwrap();

        let err = decode(&buf[..31]).unwrap_err();
        assert!(matches!(err, Error::Malformed { expected: 32, got: 31 }));

        buf.push(0);
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, Error::Malformed { expected: 32, got: 33 }));

        let err = decode(&buf[..10]).unwrap_err();
        assert!(matches!(err, Error::Malformed { expected: 16, got: 10 }));
    }

    #[test]
    fn test_bad_channel_count() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&1e-5f32.to_le_bytes());
        buf[4..8].copy_from_slice(&(-3i32).to_le_bytes());
        assert!(matches!(decode(&buf), Err(Error::InvalidArgument { .. })));
        buf[4..8].copy_from_slice(&i32::MAX.to_le_bytes());
        assert!(matches!(decode(&buf), Err(Error::Malformed { got: 16, .. })));
    }

    #[test]
    fn test_short_output_buffer() {
        let mut buf = vec![0u8; 20];
        assert!(matches!(encode(&config(), &mut buf), Err(Error::InvalidArgument { .. })));
    }
}
