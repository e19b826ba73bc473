//! SCALE helpers for header digests and transaction extensions.

use parity_scale_codec::Decode;
use xorion_core::Era;

/// `DigestItem::PreRuntime` discriminant.
const PRE_RUNTIME: u8 = 6;
const AURA_ENGINE: [u8; 4] = *b"aura";
const BABE_ENGINE: [u8; 4] = *b"BABE";

/// Block production claim found in a pre-runtime digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreRuntime {
    /// Aura: the author is the authority at `slot % authorities`.
    Aura { slot: u64 },
    /// BABE: the author index is carried directly.
    Babe { authority_index: u32 },
}

/// Parse one encoded digest item, if it is a known pre-runtime claim.
pub fn pre_runtime(log: &[u8]) -> Option<PreRuntime> {
    let (&kind, rest) = log.split_first()?;
    if kind != PRE_RUNTIME {
        return None;
    }

    let mut input = rest;
    let engine = <[u8; 4]>::decode(&mut input).ok()?;
    let data = Vec::<u8>::decode(&mut input).ok()?;

    match engine {
        AURA_ENGINE => u64::decode(&mut &data[..])
            .ok()
            .map(|slot| PreRuntime::Aura { slot }),
        BABE_ENGINE => {
            // Primary / SecondaryPlain / SecondaryVRF all start with the index.
            let (_, body) = data.split_first()?;
            u32::decode(&mut &body[..])
                .ok()
                .map(|authority_index| PreRuntime::Babe { authority_index })
        }
        _ => None,
    }
}

/// Index into the session validator set of the block author.
pub fn author_index(logs: &[Vec<u8>], authority_count: usize) -> Option<usize> {
    if authority_count == 0 {
        return None;
    }
    match logs.iter().find_map(|log| pre_runtime(log))? {
        PreRuntime::Aura { slot } => Some((slot % authority_count as u64) as usize),
        PreRuntime::Babe { authority_index } => {
            let index = authority_index as usize;
            (index < authority_count).then_some(index)
        }
    }
}

/// Decode the `CheckMortality` extension bytes.
pub fn decode_era(bytes: &[u8]) -> Option<Era> {
    match bytes {
        [0, ..] => Some(Era::Immortal),
        [first, second, ..] => {
            let encoded = u16::from_le_bytes([*first, *second]);
            let period = 2u64 << (encoded % (1 << 4));
            let quantize_factor = (period >> 12).max(1);
            let phase = (encoded >> 4) as u64 * quantize_factor;
            (period >= 4 && phase < period).then_some(Era::Mortal { period, phase })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_scale_codec::Encode;

    fn pre_runtime_log(engine: [u8; 4], data: Vec<u8>) -> Vec<u8> {
        (PRE_RUNTIME, engine, data).encode()
    }

    #[test]
    fn test_aura_author_from_slot() {
        let log = pre_runtime_log(AURA_ENGINE, 1_000_003u64.encode());
        assert_eq!(pre_runtime(&log), Some(PreRuntime::Aura { slot: 1_000_003 }));
        assert_eq!(author_index(&[log], 4), Some(3));
    }

    #[test]
    fn test_babe_author_index() {
        let mut data = vec![2u8];
        data.extend(5u32.encode());
        data.extend(99u64.encode());
        let log = pre_runtime_log(BABE_ENGINE, data);
        assert_eq!(author_index(std::slice::from_ref(&log), 10), Some(5));
        assert_eq!(author_index(&[log], 3), None);
    }

    #[test]
    fn test_non_pre_runtime_items_are_skipped() {
        // Seal item followed by an aura claim
        let seal = (5u8, *b"aura", vec![1u8, 2, 3]).encode();
        let aura = pre_runtime_log(AURA_ENGINE, 8u64.encode());
        assert_eq!(author_index(&[seal, aura], 3), Some(2));
    }

    #[test]
    fn test_no_authorities_means_no_author() {
        let log = pre_runtime_log(AURA_ENGINE, 8u64.encode());
        assert_eq!(author_index(&[log], 0), None);
        assert_eq!(author_index(&[], 5), None);
    }

    #[test]
    fn test_truncated_log_is_ignored() {
        assert_eq!(pre_runtime(&[PRE_RUNTIME, b'a', b'u']), None);
        assert_eq!(pre_runtime(&[]), None);
    }

    #[test]
    fn test_decode_era() {
        assert_eq!(decode_era(&[0]), Some(Era::Immortal));
        // period 64 (log2 - 1 = 5), phase 3
        let encoded: u16 = 5 | (3 << 4);
        assert_eq!(
            decode_era(&encoded.to_le_bytes()),
            Some(Era::Mortal { period: 64, phase: 3 })
        );
        assert_eq!(decode_era(&[]), None);
    }
}
