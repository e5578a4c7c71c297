//! Top-level chunk loop: turns a decompressed chunk stream into a document.
use super::buffer::Accumulator;
use super::chunk::*;
use super::layer::{NodeDecoder, NodeKind};
use super::{Error, Result};
use crate::document::{Document, LayerGroup, Node, MAX_DIMENSIONS};

use log::{debug, trace, warn};

#[derive(Debug)]
enum Phase {
    WaitForChunk,
    DecodeFileHeader { length: u32 },
    DecodeLayer(NodeDecoder),
    DecodeGroup(NodeDecoder),
    Success,
    Fatal,
}

/// An open group still waiting for `remaining` children.
#[derive(Debug)]
struct Frame {
    group: LayerGroup,
    remaining: u32,
}

/// Resumable chunk stream decoder.
///
/// Feed bytes with [`process_block`](Self::process_block) in pieces of any
/// size; the resulting document does not depend on how the stream was split.
/// Once an error has been returned the decoder stays failed.
#[derive(Debug)]
pub struct ChunkStreamDecoder {
    phase: Phase,
    input: Accumulator,
    pending_skip: usize,
    header: Option<FileHeader>,
    frames: Vec<Frame>,
    root: LayerGroup,
    nodes_decoded: u32,
}

impl Default for ChunkStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStreamDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::WaitForChunk,
            input: Accumulator::new(),
            pending_skip: 0,
            header: None,
            frames: vec![],
            root: LayerGroup::root(),
            nodes_decoded: 0,
        }
    }

    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Whether the ZEND chunk has been seen.
    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Success)
    }

    pub fn process_block(&mut self, bytes: &[u8]) -> Result<()> {
        match self.phase {
            Phase::Fatal => return Err(Error::internal("decoder already failed")),
            Phase::Success => {
                debug!("ignoring {} bytes after ZEND", bytes.len());
                return Ok(());
            },
            _ => {},
        }

        self.input.push(bytes);
        let result = self.run();
        if result.is_err() {
            self.phase = Phase::Fatal;
        }
        result
    }

    /// Hands out the document, failing if the stream stopped before ZEND.
    pub fn finish(self) -> Result<Document> {
        match (self.phase, self.header) {
            (Phase::Success, Some(header)) => Ok(Document {
                width: header.width,
                height: header.height,
                root: self.root,
                active_layer: None,
            }),
            (Phase::Fatal, _) => Err(Error::internal("decoder already failed")),
            (phase, _) => Err(Error::truncated(format!(
                "chunk stream ended early ({} bytes buffered, {}, {} nodes)",
                self.input.available(), phase_name(&phase), self.nodes_decoded,
            ))),
        }
    }

    fn run(&mut self) -> Result<()> {
        loop {
            if self.pending_skip > 0 {
                self.pending_skip -= self.input.skip(self.pending_skip);
                if self.pending_skip > 0 { return Ok(()); }
            }

            match &mut self.phase {
                Phase::WaitForChunk => {
                    let chunk = match ChunkHeader::read(&mut self.input) {
                        Some(chunk) => chunk,
                        None => return Ok(()),
                    };
                    trace!("chunk {}", chunk);
                    self.dispatch(chunk)?;
                },
                Phase::DecodeFileHeader { length } => {
                    let length = *length as usize;
                    let header = match FileHeader::read(&mut self.input)? {
                        Some(header) => header,
                        None => return Ok(()),
                    };
                    validate_header(&header)?;
                    debug!("file header {:?}", header);
                    self.header = Some(header);
                    self.pending_skip = length - FILE_HEADER_LEN;
                    self.phase = Phase::WaitForChunk;
                },
                Phase::DecodeLayer(node) | Phase::DecodeGroup(node) => {
                    let decoded = match node.advance(&mut self.input)? {
                        Some(decoded) => decoded,
                        None => return Ok(()),
                    };
                    trace!("decoded {:?} {:?}, {} trailing bytes", node.kind(), decoded.node.name(), decoded.trailing);
                    self.pending_skip = decoded.trailing;
                    self.phase = Phase::WaitForChunk;
                    self.close_node(decoded.node, decoded.child_count);
                },
                Phase::Success => return Ok(()),
                Phase::Fatal => return Err(Error::internal("decoder already failed")),
            }
        }
    }

    fn dispatch(&mut self, chunk: ChunkHeader) -> Result<()> {
        let header = match self.header {
            Some(header) => header,
            None if chunk.tag == TAG_HEAD => {
                if (chunk.length as usize) < FILE_HEADER_LEN {
                    return Err(Error::corrupt(format!("HEAD chunk too short: {}", chunk.length)));
                }
                self.phase = Phase::DecodeFileHeader { length: chunk.length };
                return Ok(());
            },
            None => {
                return Err(Error::corrupt(format!("expected HEAD chunk, found {}", chunk)));
            },
        };

        match chunk.tag {
            TAG_ZEND => {
                if !self.frames.is_empty() {
                    return Err(Error::structural(format!(
                        "ZEND reached with {} groups still open", self.frames.len(),
                    )));
                }
                if self.nodes_decoded != header.node_count {
                    warn!("header declares {} nodes, file holds {}", header.node_count, self.nodes_decoded);
                }
                debug!("ZEND after {} nodes", self.nodes_decoded);
                self.pending_skip = chunk.length as usize;
                self.phase = Phase::Success;
            },
            TAG_LAYR => {
                self.phase = Phase::DecodeLayer(NodeDecoder::new(NodeKind::Layer, chunk.length, header.width, header.height));
            },
            TAG_GRUP => {
                self.phase = Phase::DecodeGroup(NodeDecoder::new(NodeKind::Group, chunk.length, header.width, header.height));
            },
            TAG_HEAD => {
                return Err(Error::corrupt("multiple HEAD chunks"));
            },
            _ => {
                warn!("skipping unknown chunk {}", chunk);
                self.pending_skip = chunk.length as usize;
            },
        }
        Ok(())
    }

    /// Attaches a finished node under the innermost open group, opening a new
    /// frame for non-empty groups and closing every frame that became full.
    fn close_node(&mut self, node: Node, child_count: u32) {
        self.nodes_decoded += 1;
        if let Some(parent) = self.frames.last_mut() {
            parent.remaining -= 1;
        }

        let mut node = match node {
            Node::Group(group) if child_count > 0 => {
                self.frames.push(Frame { group, remaining: child_count });
                return;
            },
            node => node,
        };

        loop {
            let frame = match self.frames.last_mut() {
                Some(frame) => frame,
                None => {
                    self.root.children.push(node);
                    return;
                },
            };
            frame.group.children.push(node);
            if frame.remaining > 0 { return; }

            match self.frames.pop() {
                Some(full) => node = Node::Group(full.group),
                None => return,
            }
        }
    }
}

fn validate_header(header: &FileHeader) -> Result<()> {
    let FileHeader { width, height, .. } = *header;
    if width == 0 || height == 0 {
        return Err(Error::corrupt(format!("0-pixel image: {}x{}", width, height)));
    }
    if width > MAX_DIMENSIONS || height > MAX_DIMENSIONS {
        return Err(Error::corrupt(format!("Very large image (corrupt?): {}x{}", width, height)));
    }
    Ok(())
}

fn phase_name(phase: &Phase) -> &'static str {
    match phase {
        Phase::WaitForChunk => "between chunks",
        Phase::DecodeFileHeader { .. } => "inside HEAD",
        Phase::DecodeLayer(_) => "inside LAYR",
        Phase::DecodeGroup(_) => "inside GRUP",
        Phase::Success => "after ZEND",
        Phase::Fatal => "failed",
    }
}
