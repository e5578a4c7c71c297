/// Growable byte queue with an explicit read cursor.
///
/// Bytes arrive through [`Accumulator::push`] in whatever pieces the caller
/// has; readers only ever see the unconsumed tail. The consumed prefix is
/// reclaimed lazily when new data is pushed.
#[derive(Debug, Default)]
pub struct Accumulator {
    buf: Vec<u8>,
    pos: usize,
}

const COMPACT_THRESHOLD: usize = 64 * 1024;

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos >= COMPACT_THRESHOLD && self.pos * 2 >= self.buf.len() {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.pos += n.min(self.available());
    }

    /// Discards up to `n` bytes and returns how many were actually dropped.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.available());
        self.pos += n;
        n
    }

    /// Takes `n` bytes, or nothing at all when fewer are buffered.
    pub fn read_bytes(&mut self, n: usize) -> Option<&[u8]> {
        if self.available() < n { return None; }
        let start = self.pos;
        self.pos += n;
        Some(&self.buf[start..self.pos])
    }

    pub fn read_u32_be(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
