use std::collections::HashMap;

use crate::dom::{Document, NodeId};

/// Bounding box in document coordinates. `y` grows downward.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right()
    }
}

/// Visible window onto the document: size plus scroll offset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scroll_x: f32,
    pub scroll_y: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    pub fn top(&self) -> f32 {
        self.scroll_y
    }

    pub fn bottom(&self) -> f32 {
        self.scroll_y + self.height
    }
}

/// Answers geometry queries about nodes of a document. The engine never
/// computes main-text geometry itself; it only reads it from here.
pub trait GeometryProvider {
    /// Bounding box of a laid-out node. `None` for nodes the provider has
    /// no geometry for; callers treat those as absent from the page.
    fn rect_of(&mut self, doc: &Document, node: NodeId) -> Option<Rect>;

    /// Natural content height of a box (an annotation not yet placed)
    /// when wrapped at the given width, excluding box padding.
    fn measure_box(&mut self, doc: &Document, node: NodeId, width: f32) -> f32;
}

/// Scripted provider for tests and replayed scenarios. Geometry is keyed
/// by element id so entries survive node creation order.
#[derive(Debug, Default)]
pub struct FixedGeometry {
    rects: HashMap<String, Rect>,
    box_heights: HashMap<String, f32>,
    pub default_box_height: f32,
}

impl FixedGeometry {
    pub fn new() -> Self {
        Self {
            rects: HashMap::new(),
            box_heights: HashMap::new(),
            default_box_height: 60.0,
        }
    }

    pub fn set_rect(&mut self, id: &str, rect: Rect) -> &mut Self {
        self.rects.insert(id.to_string(), rect);
        self
    }

    pub fn set_box_height(&mut self, id: &str, height: f32) -> &mut Self {
        self.box_heights.insert(id.to_string(), height);
        self
    }
}

impl GeometryProvider for FixedGeometry {
    fn rect_of(&mut self, doc: &Document, node: NodeId) -> Option<Rect> {
        let id = doc.attr(node, "id")?;
        self.rects.get(id).copied()
    }

    fn measure_box(&mut self, doc: &Document, node: NodeId, _width: f32) -> f32 {
        doc.attr(node, "id")
            .and_then(|id| self.box_heights.get(id).copied())
            .unwrap_or(self.default_box_height)
    }
}
