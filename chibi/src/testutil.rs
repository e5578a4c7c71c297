use crate::document::{pixel_buffer_len, BlendMode, Document, ImageLayer, LayerGroup, Mask, Node};
use crate::format::{ChunkStreamDecoder, Result};

use quickcheck::{Arbitrary, Gen};

const MAX_SIDE: u32 = 24;
const MAX_NODES: usize = 20;
const MAX_DEPTH: usize = 3;

/// Random document: up to 20 nodes, groups nested up to 3 deep.
#[derive(Debug, Clone)]
pub struct ArbDocument(pub Document);

impl Arbitrary for ArbDocument {
    fn arbitrary(g: &mut Gen) -> Self {
        let width = 1 + u32::arbitrary(g) % MAX_SIDE;
        let height = 1 + u32::arbitrary(g) % MAX_SIDE;
        let mut doc = Document::new(width, height);
        let mut budget = 1 + usize::arbitrary(g) % MAX_NODES;
        fill(g, &mut doc.root, width, height, 0, &mut budget);
        ArbDocument(doc)
    }
}

fn fill(g: &mut Gen, group: &mut LayerGroup, width: u32, height: u32, depth: usize, budget: &mut usize) {
    let wanted = 1 + usize::arbitrary(g) % 5;
    for _ in 0..wanted {
        if *budget == 0 { return; }
        *budget -= 1;

        let node = if depth < MAX_DEPTH && u8::arbitrary(g) % 3 == 0 {
            let mut child = LayerGroup::new(String::arbitrary(g));
            child.blend_mode = blend_mode(g);
            child.alpha = u8::arbitrary(g) % 101;
            child.visible = bool::arbitrary(g);
            child.expanded = bool::arbitrary(g);
            child.mask = mask(g, width, height);
            fill(g, &mut child, width, height, depth + 1, budget);
            Node::Group(child)
        } else {
            let mut layer = ImageLayer::new(String::arbitrary(g), width, height);
            let len = pixel_buffer_len(width, height).unwrap_or(0);
            layer.pixels = (0..len).map(|_| u8::arbitrary(g)).collect();
            layer.blend_mode = blend_mode(g);
            layer.alpha = u8::arbitrary(g) % 101;
            layer.visible = bool::arbitrary(g);
            layer.clip = bool::arbitrary(g);
            layer.lock_alpha = bool::arbitrary(g);
            layer.mask = mask(g, width, height);
            Node::Layer(layer)
        };
        group.children.push(node);
    }
}

fn blend_mode(g: &mut Gen) -> BlendMode {
    g.choose(&BlendMode::ALL).copied().unwrap_or_default()
}

fn mask(g: &mut Gen, width: u32, height: u32) -> Option<Mask> {
    if !bool::arbitrary(g) { return None; }
    let mut mask = Mask::new(width, height);
    for v in mask.data.iter_mut() {
        *v = u8::arbitrary(g);
    }
    mask.linked = bool::arbitrary(g);
    mask.visible = bool::arbitrary(g);
    Some(mask)
}

/// Feeds `stream` in pieces whose sizes cycle through `sizes` (0 counts as 1).
pub fn feed_in_pieces(stream: &[u8], sizes: &[u8]) -> Result<Document> {
    let mut dec = ChunkStreamDecoder::new();
    let mut rest = stream;
    let mut i = 0;
    while !rest.is_empty() {
        let size = sizes.get(i % sizes.len().max(1)).map_or(rest.len(), |&s| (s as usize).max(1));
        let (piece, tail) = rest.split_at(size.min(rest.len()));
        dec.process_block(piece)?;
        rest = tail;
        i += 1;
    }
    dec.finish()
}
