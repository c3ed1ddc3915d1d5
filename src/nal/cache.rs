use super::{NalUnit, NalUnitType};

/// Keeps the most recently seen SPS, PPS and IDR slice so a consumer that
/// joins mid-stream can be handed a self-contained decodable prefix.
///
/// Each slot holds a full Annex-B unit including its start code, so the
/// cached bytes can be replayed as-is. Overwrite on observe, no expiry; the
/// cache survives loop restarts of the source since the encoder
/// configuration does not change across loops.
#[derive(Debug, Default)]
pub struct ParameterSetCache {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    idr: Option<Vec<u8>>,
}

impl ParameterSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `unit` if it is one of the tracked types. `buf` must be the
    /// buffer the unit was scanned from. Empty units and untracked types
    /// are ignored.
    pub fn observe(&mut self, unit: &NalUnit, buf: &[u8]) {
        if unit.is_empty() {
            return;
        }
        let slot = match unit.ty {
            Some(NalUnitType::Sps) => &mut self.sps,
            Some(NalUnitType::Pps) => &mut self.pps,
            Some(NalUnitType::SliceIdr) => &mut self.idr,
            _ => return,
        };
        // Copy from the start code so the slot replays as a valid unit
        if let Some(bytes) = buf.get(unit.start_code..unit.end) {
            *slot = Some(bytes.to_vec());
        }
    }

    /// Concatenation of the cached units in SPS, PPS, IDR order, whatever
    /// order they were observed in. Absent slots contribute nothing.
    pub fn bootstrap_units(&self) -> Vec<u8> {
        let mut units = Vec::new();
        for slot in [&self.sps, &self.pps, &self.idr] {
            if let Some(bytes) = slot {
                units.extend_from_slice(bytes);
            }
        }
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::NalScanner;

    fn annexb(units: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (ty, payload) in units {
            buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, *ty]);
            buf.extend_from_slice(payload);
        }
        buf
    }

    fn observe_all(cache: &mut ParameterSetCache, buf: &[u8]) {
        for unit in NalScanner::new(buf) {
            cache.observe(&unit, buf);
        }
    }

    #[test]
    fn test_bootstrap_order_is_fixed() {
        // Observed IDR first, then PPS, then SPS
        let buf = annexb(&[(0x65, &[0xDD]), (0x68, &[0xCC]), (0x67, &[0xAA])]);
        let mut cache = ParameterSetCache::new();
        observe_all(&mut cache, &buf);

        let expected = annexb(&[(0x67, &[0xAA]), (0x68, &[0xCC]), (0x65, &[0xDD])]);
        assert_eq!(cache.bootstrap_units(), expected);
    }

    #[test]
    fn test_cached_copy_includes_start_code() {
        let buf = annexb(&[(0x67, &[0x12, 0x34])]);
        let mut cache = ParameterSetCache::new();
        observe_all(&mut cache, &buf);

        let out = cache.bootstrap_units();
        assert_eq!(&out[..4], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(out, buf);
    }

    #[test]
    fn test_observe_is_idempotent_overwrite() {
        let buf = annexb(&[(0x67, &[0x12])]);
        let mut cache = ParameterSetCache::new();
        observe_all(&mut cache, &buf);
        let once = cache.bootstrap_units();
        observe_all(&mut cache, &buf);
        assert_eq!(cache.bootstrap_units(), once);
    }

    #[test]
    fn test_newer_unit_replaces_older() {
        let first = annexb(&[(0x67, &[0x01])]);
        let second = annexb(&[(0x67, &[0x02])]);
        let mut cache = ParameterSetCache::new();
        observe_all(&mut cache, &first);
        observe_all(&mut cache, &second);
        assert_eq!(cache.bootstrap_units(), second);
    }

    #[test]
    fn test_untracked_types_and_empty_units_ignored() {
        // SEI, a non-IDR slice, and a zero-length unit
        let mut buf = annexb(&[(0x06, &[0x05]), (0x41, &[0x99])]);
        buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]); // trailing empty unit
        let mut cache = ParameterSetCache::new();
        observe_all(&mut cache, &buf);
        assert!(cache.bootstrap_units().is_empty());
    }

    #[test]
    fn test_missing_slots_contribute_nothing() {
        let buf = annexb(&[(0x68, &[0xCC])]);
        let mut cache = ParameterSetCache::new();
        observe_all(&mut cache, &buf);
        assert_eq!(cache.bootstrap_units(), buf);
    }
}
