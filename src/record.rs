//! Fixed 20-byte record header codec.
//!
//! Layout (little-endian):
//! `crc(4) | timestamp(8) | key_size(4) | value_size(4)`, followed by
//! `key_size` key bytes and `value_size` value bytes. `value_size == 0`
//! encodes a tombstone.

pub const HEADER_CRC_OFFSET: usize = 0;
pub const HEADER_TIMESTAMP_OFFSET: usize = 4;
pub const HEADER_KEY_SIZE_OFFSET: usize = 12;
pub const HEADER_VALUE_SIZE_OFFSET: usize = 16;

/// Maximum key size: 1 MiB.
pub const MAX_KEY_SIZE: u64 = 1024 * 1024;
/// Maximum value size: 10 MiB.
pub const MAX_VALUE_SIZE: u64 = 10 * 1024 * 1024;

/// The decoded 20-byte record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub crc: u32,
    pub timestamp: u64,
    pub key_size: u32,
    pub value_size: u32,
}

impl Header {
    pub const SIZE: usize = 20;

    /// Encodes the header fields, little-endian, in field order.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].copy_from_slice(&self.crc.to_le_bytes());
        buf[HEADER_TIMESTAMP_OFFSET..HEADER_TIMESTAMP_OFFSET + 8]
            .copy_from_slice(&self.timestamp.to_le_bytes());
        buf[HEADER_KEY_SIZE_OFFSET..HEADER_KEY_SIZE_OFFSET + 4]
            .copy_from_slice(&self.key_size.to_le_bytes());
        buf[HEADER_VALUE_SIZE_OFFSET..HEADER_VALUE_SIZE_OFFSET + 4]
            .copy_from_slice(&self.value_size.to_le_bytes());
        buf
    }

    /// Decodes the header fields. Performs no range validation: width is
    /// guaranteed by the fixed-size input; size-bound and checksum
    /// checks are the caller's responsibility.
    pub fn decode(buf: &[u8; Self::SIZE]) -> Header {
        Header {
            crc: u32::from_le_bytes(buf[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].try_into().unwrap()),
            timestamp: u64::from_le_bytes(
                buf[HEADER_TIMESTAMP_OFFSET..HEADER_TIMESTAMP_OFFSET + 8]
                    .try_into()
                    .unwrap(),
            ),
            key_size: u32::from_le_bytes(
                buf[HEADER_KEY_SIZE_OFFSET..HEADER_KEY_SIZE_OFFSET + 4]
                    .try_into()
                    .unwrap(),
            ),
            value_size: u32::from_le_bytes(
                buf[HEADER_VALUE_SIZE_OFFSET..HEADER_VALUE_SIZE_OFFSET + 4]
                    .try_into()
                    .unwrap(),
            ),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let h = Header {
            crc: 0xDEADBEEF,
            timestamp: 0x0102030405060708,
            key_size: 7,
            value_size: 0,
        };
        let encoded = h.encode();
        assert_eq!(encoded.len(), Header::SIZE);
        assert_eq!(Header::decode(&encoded), h);
    }

    #[test]
    fn tombstone_is_zero_value_size() {
        let h = Header {
            crc: 0,
            timestamp: 0,
            key_size: 1,
            value_size: 0,
        };
        assert!(h.is_tombstone());
    }

    #[test]
    fn field_layout_matches_byte_offsets() {
        let h = Header {
            crc: 1,
            timestamp: 2,
            key_size: 3,
            value_size: 4,
        };
        let buf = h.encode();
        assert_eq!(&buf[0..4], &1u32.to_le_bytes());
        assert_eq!(&buf[4..12], &2u64.to_le_bytes());
        assert_eq!(&buf[12..16], &3u32.to_le_bytes());
        assert_eq!(&buf[16..20], &4u32.to_le_bytes());
    }
}
