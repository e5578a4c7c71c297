//! Serialisation of a document into a chunk stream.
use super::chunk::*;
use super::layer::{LayerFlags, NodeKind};
use super::{EncodeOptions, Error, Result};
use crate::document::{mask_buffer_len, pixel_buffer_len, BlendMode, Document, Node};

use log::{debug, trace, warn};
use std::convert::TryFrom;

/// Oldest format that can represent every node of `doc` as written.
pub fn required_version(doc: &Document) -> FormatVersion {
    let needs_current = doc.nodes().any(|node| match node {
        Node::Group(_) => true,
        Node::Layer(layer) => {
            layer.mask.is_some() || layer.clip || !disk_blend_mode(layer.blend_mode, false).0.is_legacy()
        },
    });
    if needs_current { FormatVersion::CURRENT } else { FormatVersion::LEGACY }
}

/// Writes HEAD, every node in pre-order, then ZEND. The result is not
/// compressed.
pub fn encode_chunk_stream(doc: &Document, options: &EncodeOptions) -> Result<Vec<u8>> {
    let required = required_version(doc);
    let version = if options.force_old_version {
        if !required.is_legacy() {
            warn!("writing a legacy file with content that needs version {}", required);
        }
        FormatVersion::LEGACY
    } else {
        required
    };
    let node_count = u32::try_from(doc.node_count())
        .map_err(|_| Error::not_support("too many layers"))?;
    debug!("encoding {}x{} document, {} nodes, version {}", doc.width, doc.height, node_count, version);

    let pixels_len = pixel_buffer_len(doc.width, doc.height).unwrap_or(0);
    let mut out = Vec::with_capacity(pixels_len.saturating_mul(node_count as usize).saturating_add(FILE_HEADER_LEN + 2 * CHUNK_HEADER_LEN));
    FileHeader { version, width: doc.width, height: doc.height, node_count }.write(&mut out);

    for node in doc.nodes() {
        write_node(&mut out, node, doc, options.force_old_version)?;
    }

    ChunkHeader::new(TAG_ZEND, 0).write(&mut out);
    Ok(out)
}

/// The blend mode as stored on disk plus whether the multiply marker is set.
fn disk_blend_mode(mode: BlendMode, force_old_version: bool) -> (BlendMode, bool) {
    match mode {
        BlendMode::Multiply2 if force_old_version => (BlendMode::Multiply, false),
        BlendMode::Multiply2 => (BlendMode::Multiply, true),
        mode => (mode, false),
    }
}

fn write_node(out: &mut Vec<u8>, node: &Node, doc: &Document, force_old_version: bool) -> Result<()> {
    let (kind, tag, mode, alpha, mut flags, child_count) = match node {
        Node::Layer(layer) => {
            let mut flags = LayerFlags::empty();
            flags.set(LayerFlags::VISIBLE, layer.visible);
            flags.set(LayerFlags::CLIP, layer.clip);
            flags.set(LayerFlags::LOCK_ALPHA, layer.lock_alpha);
            (NodeKind::Layer, TAG_LAYR, layer.blend_mode, layer.alpha, flags, 0)
        },
        Node::Group(group) => {
            let mut flags = LayerFlags::empty();
            flags.set(LayerFlags::VISIBLE, group.visible);
            flags.set(LayerFlags::EXPANDED, group.expanded);
            let children = u32::try_from(group.children.len())
                .map_err(|_| Error::not_support("too many children"))?;
            (NodeKind::Group, TAG_GRUP, group.blend_mode, group.alpha, flags, children)
        },
    };

    let (disk_mode, multiply2) = disk_blend_mode(mode, force_old_version);
    flags.set(LayerFlags::MULTIPLY2, multiply2);
    if let Some(mask) = node.mask() {
        flags |= LayerFlags::HAS_MASK;
        flags.set(LayerFlags::MASK_LINKED, mask.linked);
        flags.set(LayerFlags::MASK_VISIBLE, mask.visible);
    }

    let name = node.name().as_bytes();
    let header_len = kind.fixed_header_len() + name.len();
    let pixels = match node {
        Node::Layer(layer) => {
            debug_assert_eq!(Some(layer.pixels.len()), pixel_buffer_len(doc.width, doc.height));
            &layer.pixels[..]
        },
        Node::Group(_) => &[][..],
    };
    let mask = node.mask().map_or(&[][..], |m| {
        debug_assert_eq!(Some(m.data.len()), mask_buffer_len(doc.width, doc.height));
        &m.data[..]
    });

    let too_large = || Error::not_support(format!("{:?} chunk for {:?} exceeds 4 GiB", kind, node.name()));
    let length = u32::try_from(header_len + pixels.len() + mask.len()).map_err(|_| too_large())?;
    let payload_offset = u32::try_from(header_len).map_err(|_| too_large())?;
    trace!("writing {:?} {:?}: {} bytes, flags {:?}", kind, node.name(), length, flags);

    ChunkHeader::new(tag, length).write(out);
    let mut fields = vec![payload_offset, disk_mode.code(), alpha.min(100) as u32, flags.bits()];
    if kind == NodeKind::Group {
        fields.push(child_count);
    }
    fields.push(name.len() as u32);
    for field in fields {
        out.extend_from_slice(&field.to_be_bytes());
    }
    out.extend_from_slice(name);

    out.reserve(pixels.len() + mask.len());
    for px in pixels.chunks_exact(4) {
        out.extend_from_slice(&[px[3], px[0], px[1], px[2]]);
    }
    out.extend_from_slice(mask);
    Ok(())
}
