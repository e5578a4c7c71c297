//! In-memory layer tree produced by decoding and consumed by encoding.
//!
//! Pixel buffers are stored in R,G,B,A order, one byte per channel, row-major,
//! exactly `width * height * 4` bytes. Mask buffers hold one byte per pixel.
use log::debug;

/// Largest accepted width or height.
pub const MAX_DIMENSIONS: u32 = 1 << 24;

/// Byte length of an RGBA buffer for the given dimensions, or `None` when it
/// does not fit in memory addressing.
pub fn pixel_buffer_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(4)
}

/// Byte length of a mask buffer for the given dimensions.
pub fn mask_buffer_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal = 0,
    /// Multiply as the original painter implemented it.
    Multiply = 1,
    Add = 2,
    Screen = 3,
    Lighten = 4,
    Darken = 5,
    Subtract = 6,
    Dodge = 7,
    Burn = 8,
    Overlay = 9,
    HardLight = 10,
    SoftLight = 11,
    VividLight = 12,
    LinearLight = 13,
    PinLight = 14,
    Passthrough = 15,
    /// Alpha-correct multiply.
    Multiply2 = 16,
}

impl BlendMode {
    pub const ALL: [BlendMode; 17] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Add,
        BlendMode::Screen,
        BlendMode::Lighten,
        BlendMode::Darken,
        BlendMode::Subtract,
        BlendMode::Dodge,
        BlendMode::Burn,
        BlendMode::Overlay,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::VividLight,
        BlendMode::LinearLight,
        BlendMode::PinLight,
        BlendMode::Passthrough,
        BlendMode::Multiply2,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether legacy (major version 0) readers understand this code.
    pub fn is_legacy(self) -> bool {
        self.code() <= BlendMode::PinLight.code()
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        BlendMode::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub data: Vec<u8>,
    pub linked: bool,
    pub visible: bool,
}

impl Mask {
    /// A fully opaque (white) mask.
    pub fn new(width: u32, height: u32) -> Self {
        let len = mask_buffer_len(width, height).unwrap_or(0);
        Self {
            data: vec![0xff; len],
            linked: true,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayer {
    pub name: String,
    pub pixels: Vec<u8>,
    pub blend_mode: BlendMode,
    /// Opacity in percent, 0..=100.
    pub alpha: u8,
    pub visible: bool,
    pub clip: bool,
    pub lock_alpha: bool,
    pub mask: Option<Mask>,
}

impl ImageLayer {
    /// A visible, fully transparent layer.
    pub fn new<S: Into<String>>(name: S, width: u32, height: u32) -> Self {
        let len = pixel_buffer_len(width, height).unwrap_or(0);
        Self {
            name: name.into(),
            pixels: vec![0; len],
            blend_mode: BlendMode::Normal,
            alpha: 100,
            visible: true,
            clip: false,
            lock_alpha: false,
            mask: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerGroup {
    pub name: String,
    pub blend_mode: BlendMode,
    pub alpha: u8,
    pub visible: bool,
    pub expanded: bool,
    pub mask: Option<Mask>,
    /// Bottom-most child first.
    pub children: Vec<Node>,
}

impl LayerGroup {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            blend_mode: BlendMode::Passthrough,
            alpha: 100,
            visible: true,
            expanded: true,
            mask: None,
            children: vec![],
        }
    }

    /// The implicit group holding a document's top-level nodes. It is never
    /// written to disk.
    pub fn root() -> Self {
        Self {
            blend_mode: BlendMode::Normal,
            ..Self::new("")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Layer(ImageLayer),
    Group(LayerGroup),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Layer(layer) => &layer.name,
            Node::Group(group) => &group.name,
        }
    }

    pub fn mask(&self) -> Option<&Mask> {
        match self {
            Node::Layer(layer) => layer.mask.as_ref(),
            Node::Group(group) => group.mask.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    pub root: LayerGroup,
    /// Index path from the root to the layer selected for editing.
    pub active_layer: Option<Vec<usize>>,
}

impl Document {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            root: LayerGroup::root(),
            active_layer: None,
        }
    }

    /// All nodes below the root, each group before its children.
    pub fn nodes(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self.root.children.iter()] }
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn layer_at(&self, path: &[usize]) -> Option<&Node> {
        let (&last, parents) = path.split_last()?;
        let mut group = &self.root;
        for &index in parents {
            match group.children.get(index)? {
                Node::Group(child) => group = child,
                Node::Layer(_) => return None,
            }
        }
        group.children.get(last)
    }

    /// Points `active_layer` at the last image layer in pre-order, which is the
    /// top-most one drawn.
    pub fn select_initial_active_layer(&mut self) {
        fn search(group: &LayerGroup, path: &mut Vec<usize>) -> bool {
            for (index, child) in group.children.iter().enumerate().rev() {
                path.push(index);
                match child {
                    Node::Layer(_) => return true,
                    Node::Group(inner) => if search(inner, path) { return true; },
                }
                path.pop();
            }
            false
        }

        let mut path = vec![];
        self.active_layer = if search(&self.root, &mut path) { Some(path) } else { None };
        debug!("initial active layer: {:?}", self.active_layer);
    }

    /// Switches layers using legacy multiply to the alpha-correct variant.
    ///
    /// With `bake`, pixels are also flattened against white so that the layer
    /// multiplies the same as before over opaque backdrops. Returns how many
    /// layers changed.
    pub fn upgrade_multiply_layers(&mut self, bake: bool) -> usize {
        fn visit(group: &mut LayerGroup, bake: bool) -> usize {
            let mut upgraded = 0;
            for child in group.children.iter_mut() {
                match child {
                    Node::Layer(layer) if layer.blend_mode == BlendMode::Multiply => {
                        layer.blend_mode = BlendMode::Multiply2;
                        if bake {
                            bake_multiply(&mut layer.pixels);
                        }
                        upgraded += 1;
                    },
                    Node::Layer(_) => {},
                    Node::Group(inner) => upgraded += visit(inner, bake),
                }
            }
            upgraded
        }

        let upgraded = visit(&mut self.root, bake);
        debug!("upgraded {} multiply layers (bake={})", upgraded, bake);
        upgraded
    }
}

fn bake_multiply(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = px[3] as u32;
        for c in px[..3].iter_mut() {
            *c = (255 - (a * (255 - *c as u32) + 127) / 255) as u8;
        }
        px[3] = 0xff;
    }
}

pub struct PreOrder<'a> {
    stack: Vec<std::slice::Iter<'a, Node>>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(node) => {
                    if let Node::Group(group) = node {
                        self.stack.push(group.children.iter());
                    }
                    return Some(node);
                },
                None => { self.stack.pop(); },
            }
        }
    }
}
