//! Incremental decoders for pixel and mask payloads.
//!
//! Both decoders write into a buffer allocated up front and may be fed any
//! number of input slices, split anywhere, including in the middle of a pixel.

/// A decoder filling a fixed-size destination from a byte stream.
pub trait PixelStreamDecoder {
    /// Consumes as much of `input` as the destination still needs.
    ///
    /// Returns the unused tail of `input` once the destination is full (empty
    /// if the input ended exactly there), or `None` when all of `input` was
    /// consumed and more is needed.
    fn decode<'a>(&mut self, input: &'a [u8]) -> Option<&'a [u8]>;

    fn is_done(&self) -> bool;

    fn bytes_total(&self) -> usize;

    fn into_buffer(self) -> Vec<u8>;
}

/// Reorders on-disk A,R,G,B pixels into in-memory R,G,B,A.
#[derive(Debug)]
pub struct ColorPixelsDecoder {
    buffer: Vec<u8>,
    bytes_read: usize,
    bytes_total: usize,
}

impl ColorPixelsDecoder {
    pub fn new(buffer: Vec<u8>, bytes_total: usize) -> Self {
        debug_assert!(bytes_total <= buffer.len());
        debug_assert!(bytes_total % 4 == 0);
        Self { buffer, bytes_read: 0, bytes_total }
    }

    #[inline(always)]
    fn put(&mut self, byte: u8) {
        let i = self.bytes_read;
        // disk channel 0 (A) lands in slot 3, the others shift down by one
        self.buffer[(i & !3) + ((i + 3) & 3)] = byte;
        self.bytes_read += 1;
    }
}

impl PixelStreamDecoder for ColorPixelsDecoder {
    fn decode<'a>(&mut self, input: &'a [u8]) -> Option<&'a [u8]> {
        let wanted = self.bytes_total - self.bytes_read;
        let (mut src, rest) = input.split_at(input.len().min(wanted));

        while self.bytes_read % 4 != 0 && !src.is_empty() {
            self.put(src[0]);
            src = &src[1..];
        }

        let whole = src.len() / 4 * 4;
        let start = self.bytes_read;
        let dst = &mut self.buffer[start..start + whole];
        for (d, s) in dst.chunks_exact_mut(4).zip(src[..whole].chunks_exact(4)) {
            d[0] = s[1];
            d[1] = s[2];
            d[2] = s[3];
            d[3] = s[0];
        }
        self.bytes_read += whole;

        for &byte in &src[whole..] {
            self.put(byte);
        }

        if self.is_done() { Some(rest) } else { None }
    }

    fn is_done(&self) -> bool {
        self.bytes_read == self.bytes_total
    }

    fn bytes_total(&self) -> usize {
        self.bytes_total
    }

    fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// Straight copy of 8-bit mask values.
#[derive(Debug)]
pub struct MaskDecoder {
    buffer: Vec<u8>,
    bytes_read: usize,
    bytes_total: usize,
}

impl MaskDecoder {
    pub fn new(buffer: Vec<u8>, bytes_total: usize) -> Self {
        debug_assert!(bytes_total <= buffer.len());
        Self { buffer, bytes_read: 0, bytes_total }
    }
}

impl PixelStreamDecoder for MaskDecoder {
    fn decode<'a>(&mut self, input: &'a [u8]) -> Option<&'a [u8]> {
        let n = input.len().min(self.bytes_total - self.bytes_read);
        let (src, rest) = input.split_at(n);
        self.buffer[self.bytes_read..self.bytes_read + n].copy_from_slice(src);
        self.bytes_read += n;

        if self.is_done() { Some(rest) } else { None }
    }

    fn is_done(&self) -> bool {
        self.bytes_read == self.bytes_total
    }

    fn bytes_total(&self) -> usize {
        self.bytes_total
    }

    fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}
