use crate::geometry::Rect;

/// Which margin a column occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// A vertical span of a column no annotation may occupy. Column-relative
/// coordinates, spacing already folded into both edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstructionRange {
    pub top: f32,
    pub bottom: f32,
}

/// An annotation already accepted into a cell, at its default offset.
#[derive(Debug, Clone, Copy)]
pub struct CellNote {
    /// Index into the layout pass's note slice.
    pub note: usize,
    /// Cell-relative offset the note wants before overlap resolution.
    pub default_offset: f32,
}

/// A maximal placeable span between obstructions. `room` starts at
/// `height` and shrinks as notes are assigned.
#[derive(Debug, Clone)]
pub struct Cell {
    pub top: f32,
    pub bottom: f32,
    pub height: f32,
    pub room: f32,
    pub notes: Vec<CellNote>,
}

impl Cell {
    pub fn new(top: f32, bottom: f32) -> Self {
        let height = bottom - top;
        Self {
            top,
            bottom,
            height,
            room: height,
            notes: Vec::new(),
        }
    }

    /// Whether the span can hold anything at all; zero and negative
    /// height cells exist but never qualify.
    pub fn can_hold(&self, height: f32) -> bool {
        self.room >= height
    }
}

/// One column's placement surface for a layout pass.
#[derive(Debug, Clone)]
pub struct ColumnSurface {
    pub side: Side,
    pub rect: Rect,
    pub cells: Vec<Cell>,
}

/// Layout-facing view of one annotation: its box height and where its
/// citation sits on the page.
#[derive(Debug, Clone, Copy)]
pub struct NoteBox {
    pub id: u32,
    pub height: f32,
    pub citation: Rect,
}

/// Where an annotation ended up: column, cell index, and its final top
/// offset relative to the column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub side: Side,
    pub cell: usize,
    pub offset: f32,
}
