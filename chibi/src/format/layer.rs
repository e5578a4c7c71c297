//! Decoding of a single LAYR or GRUP chunk body.
use super::buffer::Accumulator;
use super::pixels::{ColorPixelsDecoder, MaskDecoder, PixelStreamDecoder};
use super::{Error, Result};
use crate::document::{mask_buffer_len, pixel_buffer_len, BlendMode, ImageLayer, LayerGroup, Mask, Node};

use bitflags::bitflags;
use log::{debug, trace, warn};

bitflags! {
    /// Per-node flag word.
    pub struct LayerFlags: u32 {
        const VISIBLE      = 1 << 0;
        /// Clip to the layer below. Image layers only.
        const CLIP         = 1 << 1;
        const HAS_MASK     = 1 << 2;
        const MASK_LINKED  = 1 << 3;
        const MASK_VISIBLE = 1 << 4;
        /// Groups only.
        const EXPANDED     = 1 << 5;
        const LOCK_ALPHA   = 1 << 6;
        /// Legacy multiply on disk stands for the alpha-correct variant.
        const MULTIPLY2    = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Layer,
    Group,
}

impl NodeKind {
    /// Bytes of fixed header before the name.
    pub fn fixed_header_len(self) -> usize {
        match self {
            NodeKind::Layer => 5 * 4,
            NodeKind::Group => 6 * 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FixedHeader {
    payload_offset: u32,
    blend_mode: u32,
    alpha: u32,
    flags: LayerFlags,
    child_count: u32,
    name_length: u32,
}

impl FixedHeader {
    fn blend_mode(&self) -> BlendMode {
        match BlendMode::from_code(self.blend_mode) {
            Some(BlendMode::Multiply) if self.flags.contains(LayerFlags::MULTIPLY2) => BlendMode::Multiply2,
            Some(mode) => mode,
            None => {
                warn!("unknown blend mode {}, using normal", self.blend_mode);
                BlendMode::Normal
            },
        }
    }

    fn alpha(&self) -> u8 {
        self.alpha.min(100) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FixedHeader,
    VariableHeader,
    ImageData,
    MaskData,
    SkipTrailing,
    Complete,
}

/// A fully decoded node plus what the chunk loop needs to place it.
#[derive(Debug)]
pub struct DecodedNode {
    pub node: Node,
    /// Declared number of children; always 0 for image layers.
    pub child_count: u32,
    /// Bytes left in the chunk after everything this decoder understood.
    pub trailing: usize,
}

/// Resumable decoder for one node chunk.
///
/// Each call to [`NodeDecoder::advance`] consumes whatever it can from the
/// shared input and stops as soon as more bytes are needed.
#[derive(Debug)]
pub struct NodeDecoder {
    kind: NodeKind,
    chunk_length: usize,
    width: u32,
    height: u32,
    state: State,
    header: Option<FixedHeader>,
    padding: usize,
    name: String,
    color: Option<ColorPixelsDecoder>,
    mask: Option<MaskDecoder>,
}

impl NodeDecoder {
    pub fn new(kind: NodeKind, chunk_length: u32, width: u32, height: u32) -> Self {
        Self {
            kind,
            chunk_length: chunk_length as usize,
            width,
            height,
            state: State::FixedHeader,
            header: None,
            padding: 0,
            name: String::new(),
            color: None,
            mask: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn advance(&mut self, input: &mut Accumulator) -> Result<Option<DecodedNode>> {
        loop {
            if self.padding > 0 {
                self.padding -= input.skip(self.padding);
                if self.padding > 0 { return Ok(None); }
            }

            trace!("{:?} chunk state {:?}, {} bytes buffered", self.kind, self.state, input.available());
            match self.state {
                State::FixedHeader => {
                    if input.available() < self.kind.fixed_header_len() { return Ok(None); }
                    self.read_fixed_header(input)?;
                    self.state = State::VariableHeader;
                },
                State::VariableHeader => {
                    let header = self.fixed_header()?;
                    let name = match input.read_bytes(header.name_length as usize) {
                        Some(bytes) => decode_name(bytes),
                        None => return Ok(None),
                    };
                    self.name = name;

                    let header_len = self.kind.fixed_header_len() + header.name_length as usize;
                    let payload_offset = header.payload_offset as usize;
                    if payload_offset < header_len {
                        return Err(Error::corrupt(format!(
                            "payload offset {} inside {}-byte header", payload_offset, header_len,
                        )));
                    }
                    self.allocate(&header)?;
                    self.padding = payload_offset - header_len;
                    if self.padding > 0 {
                        debug!("skipping {} bytes of newer header fields", self.padding);
                    }

                    self.state = if self.color.is_some() {
                        State::ImageData
                    } else if self.mask.is_some() {
                        State::MaskData
                    } else {
                        State::SkipTrailing
                    };
                },
                State::ImageData => {
                    if let Some(color) = self.color.as_mut() {
                        if !feed(color, input) { return Ok(None); }
                    }
                    self.state = if self.mask.is_some() { State::MaskData } else { State::SkipTrailing };
                },
                State::MaskData => {
                    if let Some(mask) = self.mask.as_mut() {
                        if !feed(mask, input) { return Ok(None); }
                    }
                    self.state = State::SkipTrailing;
                },
                State::SkipTrailing => {
                    let header = self.fixed_header()?;
                    let consumed = header.payload_offset as usize
                        + self.color.as_ref().map_or(0, |c| c.bytes_total())
                        + self.mask.as_ref().map_or(0, |m| m.bytes_total());
                    let trailing = self.chunk_length.checked_sub(consumed).ok_or_else(|| Error::corrupt(format!(
                        "{:?} chunk declares {} bytes but holds {}", self.kind, self.chunk_length, consumed,
                    )))?;
                    self.state = State::Complete;
                    return Ok(Some(self.build(&header, trailing)));
                },
                State::Complete => {
                    return Err(Error::internal("node decoder advanced after completion"));
                },
            }
        }
    }

    fn fixed_header(&self) -> Result<FixedHeader> {
        self.header.ok_or_else(|| Error::internal("fixed header not read"))
    }

    fn read_fixed_header(&mut self, input: &mut Accumulator) -> Result<()> {
        let mut next = || input.read_u32_be().ok_or_else(|| Error::internal("fixed header underrun"));
        let payload_offset = next()?;
        let blend_mode = next()?;
        let alpha = next()?;
        let flags = LayerFlags::from_bits_truncate(next()?);
        let child_count = if self.kind == NodeKind::Group { next()? } else { 0 };
        let name_length = next()?;

        if name_length as usize > self.chunk_length {
            return Err(Error::corrupt(format!(
                "name of {} bytes in a {}-byte chunk", name_length, self.chunk_length,
            )));
        }

        trace!(
            "{:?} header: offset={}, blend={}, alpha={}, flags={:?}, children={}, name_len={}",
            self.kind, payload_offset, blend_mode, alpha, flags, child_count, name_length,
        );
        self.header = Some(FixedHeader { payload_offset, blend_mode, alpha, flags, child_count, name_length });
        Ok(())
    }

    /// Sizes the payload buffers, refusing any the chunk cannot hold so that
    /// a short chunk never costs a canvas-sized allocation.
    fn allocate(&mut self, header: &FixedHeader) -> Result<()> {
        let (width, height) = (self.width, self.height);
        let too_large = move || Error::corrupt(format!("too large: {}x{}", width, height));
        let mask_len = if header.flags.contains(LayerFlags::HAS_MASK) {
            Some(mask_buffer_len(width, height).ok_or_else(too_large)?)
        } else {
            None
        };
        let pixel_len = if self.kind == NodeKind::Layer {
            Some(pixel_buffer_len(width, height).ok_or_else(too_large)?)
        } else {
            None
        };

        let needed = (header.payload_offset as usize)
            .checked_add(pixel_len.unwrap_or(0))
            .and_then(|n| n.checked_add(mask_len.unwrap_or(0)));
        match needed {
            Some(needed) if needed <= self.chunk_length => {},
            _ => return Err(Error::corrupt(format!(
                "{:?} chunk of {} bytes cannot hold a {}x{} payload", self.kind, self.chunk_length, width, height,
            ))),
        }

        self.mask = mask_len.map(|len| MaskDecoder::new(vec![0; len], len));
        self.color = pixel_len.map(|len| ColorPixelsDecoder::new(vec![0; len], len));
        Ok(())
    }

    fn build(&mut self, header: &FixedHeader, trailing: usize) -> DecodedNode {
        let flags = header.flags;
        let mask = self.mask.take().map(|m| Mask {
            data: m.into_buffer(),
            linked: flags.contains(LayerFlags::MASK_LINKED),
            visible: flags.contains(LayerFlags::MASK_VISIBLE),
        });
        let name = std::mem::take(&mut self.name);

        let node = match self.kind {
            NodeKind::Layer => Node::Layer(ImageLayer {
                name,
                pixels: self.color.take().map(|c| c.into_buffer()).unwrap_or_default(),
                blend_mode: header.blend_mode(),
                alpha: header.alpha(),
                visible: flags.contains(LayerFlags::VISIBLE),
                clip: flags.contains(LayerFlags::CLIP),
                lock_alpha: flags.contains(LayerFlags::LOCK_ALPHA),
                mask,
            }),
            NodeKind::Group => Node::Group(LayerGroup {
                name,
                blend_mode: header.blend_mode(),
                alpha: header.alpha(),
                visible: flags.contains(LayerFlags::VISIBLE),
                expanded: flags.contains(LayerFlags::EXPANDED),
                mask,
                children: vec![],
            }),
        };

        DecodedNode { node, child_count: header.child_count, trailing }
    }
}

/// Returns whether the decoder is full.
fn feed<D: PixelStreamDecoder>(decoder: &mut D, input: &mut Accumulator) -> bool {
    let available = input.remaining();
    let used = match decoder.decode(available) {
        Some(rest) => available.len() - rest.len(),
        None => available.len(),
    };
    input.consume(used);
    decoder.is_done()
}

/// Names are UTF-8; anything else is kept byte-for-byte as Latin-1.
fn decode_name(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(name) => name.to_owned(),
        Err(e) => {
            warn!("layer name is not UTF-8 ({}), reading as Latin-1", e);
            bytes.iter().map(|&b| b as char).collect()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ErrorKind;

    struct Body {
        bytes: Vec<u8>,
    }

    impl Body {
        fn new(fields: &[u32]) -> Self {
            let mut bytes = vec![];
            for f in fields {
                bytes.extend_from_slice(&f.to_be_bytes());
            }
            Self { bytes }
        }

        fn raw(mut self, data: &[u8]) -> Self {
            self.bytes.extend_from_slice(data);
            self
        }
    }

    fn run(kind: NodeKind, body: &[u8], width: u32, height: u32, split: usize) -> Result<DecodedNode> {
        let mut dec = NodeDecoder::new(kind, body.len() as u32, width, height);
        let mut acc = Accumulator::new();
        for piece in body.chunks(split.max(1)) {
            acc.push(piece);
            if let Some(node) = dec.advance(&mut acc)? {
                return Ok(node);
            }
        }
        Err(Error::truncated("body ended"))
    }

    fn one_pixel_layer(offset: u32, flags: u32, blend: u32) -> Vec<u8> {
        let header_len = 20 + 2;
        Body::new(&[offset, blend, 50, flags, 2])
            .raw(b"ab")
            .raw(&vec![0xee; offset as usize - header_len])
            .raw(&[0xff, 1, 2, 3])
            .bytes
    }

    #[test]
    fn layer_with_header_padding() {
        let body = one_pixel_layer(30, LayerFlags::VISIBLE.bits(), 0);
        for split in 1..body.len() {
            let decoded = run(NodeKind::Layer, &body, 1, 1, split).ok();
            let node = decoded.as_ref().map(|d| &d.node);
            match node {
                Some(Node::Layer(layer)) => {
                    assert_eq!(layer.name, "ab");
                    assert_eq!(layer.alpha, 50);
                    assert!(layer.visible);
                    assert_eq!(layer.pixels, [1, 2, 3, 0xff]);
                },
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(decoded.map(|d| d.trailing), Some(0));
        }
    }

    #[test]
    fn trailing_writer_padding_is_reported() {
        let mut body = one_pixel_layer(22, 0, 0);
        body.extend_from_slice(&[0; 6]);
        let mut dec = NodeDecoder::new(NodeKind::Layer, body.len() as u32, 1, 1);
        let mut acc = Accumulator::new();
        acc.push(&body[..26]);
        let decoded = dec.advance(&mut acc).ok().flatten();
        assert_eq!(decoded.map(|d| d.trailing), Some(6));
        assert_eq!(acc.available(), 0);
    }

    #[test]
    fn multiply_marker_selects_new_variant() {
        let marked = one_pixel_layer(22, LayerFlags::MULTIPLY2.bits(), BlendMode::Multiply.code());
        let plain = one_pixel_layer(22, 0, BlendMode::Multiply.code());
        let marked_screen = one_pixel_layer(22, LayerFlags::MULTIPLY2.bits(), BlendMode::Screen.code());

        let blend = |body: &[u8]| match run(NodeKind::Layer, body, 1, 1, 64).map(|d| d.node) {
            Ok(Node::Layer(layer)) => layer.blend_mode,
            _ => panic!("layer expected"),
        };
        assert_eq!(blend(&marked), BlendMode::Multiply2);
        assert_eq!(blend(&plain), BlendMode::Multiply);
        assert_eq!(blend(&marked_screen), BlendMode::Screen);
    }

    #[test]
    fn group_with_mask() {
        let flags = LayerFlags::HAS_MASK | LayerFlags::MASK_VISIBLE | LayerFlags::EXPANDED;
        let body = Body::new(&[24 + 1, BlendMode::Passthrough.code(), 100, flags.bits(), 3, 1])
            .raw(b"g")
            .raw(&[9, 8])
            .bytes;
        let decoded = run(NodeKind::Group, &body, 2, 1, 3).ok();
        assert_eq!(decoded.as_ref().map(|d| d.child_count), Some(3));
        match decoded.map(|d| d.node) {
            Some(Node::Group(group)) => {
                assert_eq!(group.name, "g");
                assert_eq!(group.blend_mode, BlendMode::Passthrough);
                assert!(group.expanded);
                assert!(!group.visible);
                assert_eq!(group.mask, Some(Mask { data: vec![9, 8], linked: false, visible: true }));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_utf8_name_is_kept_as_latin1() {
        let body = Body::new(&[22, 0, 100, 0, 2]).raw(&[0xe9, 0x41]).raw(&[0; 4]).bytes;
        match run(NodeKind::Layer, &body, 1, 1, 100).map(|d| d.node) {
            Ok(Node::Layer(layer)) => assert_eq!(layer.name, "\u{e9}A"),
            _ => panic!("layer expected"),
        }
    }

    #[test]
    fn offset_inside_header_is_corrupt() {
        let body = Body::new(&[21, 0, 100, 0, 2]).raw(b"ab").raw(&[0; 4]).bytes;
        let err = run(NodeKind::Layer, &body, 1, 1, 100).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Corrupt));
    }

    #[test]
    fn short_declared_length_is_corrupt() {
        let body = one_pixel_layer(22, 0, 0);
        let mut dec = NodeDecoder::new(NodeKind::Layer, body.len() as u32 - 1, 1, 1);
        let mut acc = Accumulator::new();
        acc.push(&body);
        let err = dec.advance(&mut acc).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Corrupt));
    }

    #[test]
    fn huge_canvas_in_short_chunk_is_corrupt() {
        let side = crate::document::MAX_DIMENSIONS;
        let body = Body::new(&[20, 0, 100, 0, 0]).bytes;
        let mut dec = NodeDecoder::new(NodeKind::Layer, body.len() as u32, side, side);
        let mut acc = Accumulator::new();
        acc.push(&body);
        let err = dec.advance(&mut acc).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Corrupt));

        let flags = LayerFlags::HAS_MASK.bits();
        let group = Body::new(&[24, 0, 100, flags, 0, 0]).bytes;
        let mut dec = NodeDecoder::new(NodeKind::Group, group.len() as u32, side, side);
        let mut acc = Accumulator::new();
        acc.push(&group);
        let err = dec.advance(&mut acc).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Corrupt));
    }

    #[test]
    fn alpha_is_clamped() {
        let body = Body::new(&[20, 0, 250, 0, 0]).raw(&[0; 4]).bytes;
        match run(NodeKind::Layer, &body, 1, 1, 100).map(|d| d.node) {
            Ok(Node::Layer(layer)) => assert_eq!(layer.alpha, 100),
            _ => panic!("layer expected"),
        }
    }
}
