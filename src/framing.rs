//! Length-prefixed multi-packet wire format (spec §4.2, §6.2):
//!
//! `[count: u8] ( [len_hi: u8] [len_lo: u8] [payload: u8 * len] ){count}`
//!
//! Used both for encoder-to-server transmission and as the `data` field of
//! [`crate::chunk::CompressedAudioChunk`].

use crate::error::{CoreError, CoreResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Packs a list of opaque packets into one blob. Each packet's length must
/// fit in 16 bits; this is unchecked per spec (Opus frames at 60ms/48kHz are
/// well under the limit).
pub fn pack_multi(packets: &[Vec<u8>]) -> Vec<u8> {
    let total_len = 1 + packets.iter().map(|p| 2 + p.len()).sum::<usize>();
    let mut out = Vec::with_capacity(total_len);
    out.write_u8(packets.len() as u8).unwrap();
    for packet in packets {
        out.write_u16::<BigEndian>(packet.len() as u16).unwrap();
        out.extend_from_slice(packet);
    }
    out
}

/// Reverses [`pack_multi`]. Fails with [`CoreError::MalformedFrame`] if a
/// declared length runs past the end of the blob.
pub fn unpack_multi(blob: &[u8]) -> CoreResult<Vec<Vec<u8>>> {
    let mut cursor = Cursor::new(blob);
    let count = cursor.read_u8().map_err(|_| CoreError::MalformedFrame {
        reason: "missing packet count",
    })?;

    let mut packets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = cursor
            .read_u16::<BigEndian>()
            .map_err(|_| CoreError::MalformedFrame {
                reason: "missing packet length prefix",
            })? as usize;

        let start = cursor.position() as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= blob.len())
            .ok_or(CoreError::MalformedFrame {
                reason: "packet length runs past end of blob",
            })?;

        packets.push(blob[start..end].to_vec());
        cursor.set_position(end as u64);
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_empty() {
        let packets: Vec<Vec<u8>> = vec![];
        let packed = pack_multi(&packets);
        assert_eq!(packed, vec![0u8]);
        assert_eq!(unpack_multi(&packed).unwrap(), packets);
    }

    #[test]
    fn round_trip_several_packets() {
        let packets = vec![vec![0x00], vec![0xDE, 0xAD, 0xBE, 0xEF], vec![]];
        let packed = pack_multi(&packets);
        assert_eq!(unpack_multi(&packed).unwrap(), packets);
    }

    #[test]
    fn malformed_truncated_blob_fails() {
        let packets = vec![vec![1, 2, 3, 4, 5]];
        let mut packed = pack_multi(&packets);
        packed.truncate(packed.len() - 1);
        let err = unpack_multi(&packed).unwrap_err();
        assert!(matches!(err, CoreError::MalformedFrame { .. }));
    }

    #[test]
    fn malformed_missing_length_prefix_fails() {
        let blob = vec![1u8, 0x00]; // count=1 but only one length byte present
        let err = unpack_multi(&blob).unwrap_err();
        assert!(matches!(err, CoreError::MalformedFrame { .. }));
    }
}
