//! Byte-order helpers.
//!
//! On disk every multi-byte field is big-endian. In memory, once a node has
//! been decoded, the same fields are in host order. The `swap_*` helpers
//! convert one field in place and return its host value either way, so the
//! same walk serves both directions.

/// Which way a conversion runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Big-endian on-disk bytes to host order.
    ToHost,
    /// Host order to big-endian on-disk bytes.
    ToDisk,
}

pub(crate) fn swap_u16(data: &mut [u8], offset: usize, direction: Direction) -> u16 {
    let raw = [data[offset], data[offset + 1]];
    let (value, out) = match direction {
        Direction::ToHost => {
            let value = u16::from_be_bytes(raw);
            (value, value.to_ne_bytes())
        }
        Direction::ToDisk => {
            let value = u16::from_ne_bytes(raw);
            (value, value.to_be_bytes())
        }
    };
    data[offset..offset + 2].copy_from_slice(&out);
    value
}

pub(crate) fn swap_u32(data: &mut [u8], offset: usize, direction: Direction) -> u32 {
    let raw = [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ];
    let (value, out) = match direction {
        Direction::ToHost => {
            let value = u32::from_be_bytes(raw);
            (value, value.to_ne_bytes())
        }
        Direction::ToDisk => {
            let value = u32::from_ne_bytes(raw);
            (value, value.to_be_bytes())
        }
    };
    data[offset..offset + 4].copy_from_slice(&out);
    value
}

pub(crate) fn host_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn host_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub(crate) fn set_host_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_ne_bytes());
}

pub(crate) fn set_host_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_u16_both_directions() {
        let mut data = [0x12, 0x34];
        assert_eq!(swap_u16(&mut data, 0, Direction::ToHost), 0x1234);
        assert_eq!(host_u16(&data, 0), 0x1234);
        assert_eq!(swap_u16(&mut data, 0, Direction::ToDisk), 0x1234);
        assert_eq!(data, [0x12, 0x34]);
    }

    #[test]
    fn test_swap_u32_at_offset() {
        let mut data = [0xFF, 0x00, 0x00, 0x01, 0x02];
        assert_eq!(swap_u32(&mut data, 1, Direction::ToHost), 0x0102);
        assert_eq!(data[0], 0xFF);
        assert_eq!(host_u32(&data, 1), 0x0102);
    }
}
