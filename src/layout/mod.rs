pub mod assign;
pub mod obstructions;
pub mod resolve;
pub mod types;

pub use assign::{assign_notes, side_eligible};
pub use obstructions::{collect_ranges, merge_ranges, partition_cells};
pub use resolve::{ResolvedNote, resolve_cell};
pub use types::{Cell, CellNote, ColumnSurface, NoteBox, ObstructionRange, Placement, Side};
