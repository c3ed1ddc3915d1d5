/// H.264 NAL unit types (low 5 bits of the header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    SliceNonIdr,
    SliceIdr,
    Sei,
    Sps,
    Pps,
    Aud,
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NalUnitType::SliceNonIdr,
            5 => NalUnitType::SliceIdr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            n => NalUnitType::Other(n),
        }
    }
}

impl NalUnitType {
    pub fn is_keyframe(&self) -> bool {
        matches!(self, NalUnitType::SliceIdr)
    }
}

/// One NAL unit located inside a scanned buffer. Holds offsets only, not
/// data; copy `[start_code, end)` out before the buffer goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    /// Type tag, or None for a zero-length unit (adjacent start codes).
    pub ty: Option<NalUnitType>,
    /// Offset of the unit's 4-byte start code.
    pub start_code: usize,
    /// Payload start (first byte after the start code).
    pub start: usize,
    /// Payload end, exclusive.
    pub end: usize,
}

impl NalUnit {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Annex-B 4-byte start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Lazy scanner over an Annex-B buffer, yielding units delimited by 4-byte
/// start codes in buffer order.
///
/// Only the 4-byte form `00 00 00 01` is recognized; bytes behind a 3-byte
/// code are skipped until the next 4-byte code, same as bytes before the
/// first start code. A buffer shorter than 4 bytes, or one with no start
/// code, yields nothing.
pub struct NalScanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> NalScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn find_start_code(&self, from: usize) -> Option<usize> {
        let mut i = from;
        while i + START_CODE.len() <= self.buf.len() {
            if self.buf[i..i + START_CODE.len()] == START_CODE {
                return Some(i);
            }
            i += 1;
        }
        None
    }
}

impl Iterator for NalScanner<'_> {
    type Item = NalUnit;

    fn next(&mut self) -> Option<NalUnit> {
        let start_code = self.find_start_code(self.pos)?;
        let start = start_code + START_CODE.len();
        let end = self.find_start_code(start).unwrap_or(self.buf.len());
        self.pos = end;

        let ty = if start < end {
            self.buf.get(start).map(|b| NalUnitType::from(*b))
        } else {
            None
        };

        Some(NalUnit {
            ty,
            start_code,
            start,
            end,
        })
    }
}
