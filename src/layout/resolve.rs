use crate::geometry::Rect;

use super::types::{Cell, NoteBox};

/// A note's final position within its cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedNote {
    /// Index into the layout pass's note slice.
    pub note: usize,
    /// Final cell-relative top offset.
    pub offset: f32,
}

/// Resolve vertical overlaps among the notes assigned to one cell.
///
/// Each overlap between adjacent notes is split: the lower note moves
/// down by half, and a window of predecessors absorbs the other half by
/// moving up, growing backward whenever a predecessor lacks the slack.
/// Whatever the window cannot absorb goes back into the downward move.
/// A final bottom-edge check pushes the tail window up by the full
/// excess, keeping earlier notes untouched when possible.
pub fn resolve_cell(
    cell: &Cell,
    notes: &[NoteBox],
    column: &Rect,
    spacing: f32,
    bias: f32,
) -> Vec<ResolvedNote> {
    let mut order: Vec<(usize, f32, f32)> = cell
        .notes
        .iter()
        .map(|cn| {
            let nb = &notes[cn.note];
            let citation_y = nb.citation.y - column.y;
            let offset = (citation_y - cell.top + bias).max(0.0);
            (cn.note, offset, nb.height)
        })
        .collect();
    order.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then_with(|| notes[a.0].id.cmp(&notes[b.0].id))
    });

    let mut offsets: Vec<f32> = order.iter().map(|e| e.1).collect();
    let heights: Vec<f32> = order.iter().map(|e| e.2).collect();

    for i in 1..offsets.len() {
        let required = offsets[i - 1] + heights[i - 1] + spacing;
        if offsets[i] < required {
            let overlap = required - offsets[i];
            let absorbed = push_window_up(&mut offsets, &heights, i - 1, overlap / 2.0, spacing);
            offsets[i] += overlap - absorbed;
        }
    }

    if let Some(last) = offsets.len().checked_sub(1) {
        let excess = offsets[last] + heights[last] - cell.height;
        if excess > 0.0 {
            push_window_up(&mut offsets, &heights, last, excess, spacing);
        }
    }

    order
        .iter()
        .zip(&offsets)
        .map(|(&(note, _, _), &offset)| ResolvedNote { note, offset })
        .collect()
}

/// Move note `last` up by as much of `amount` as the cell allows,
/// recruiting predecessors when the gap above `last` is too small.
/// Returns how far `last` actually moved. Offsets never go below zero.
fn push_window_up(offsets: &mut [f32], heights: &[f32], last: usize, amount: f32, spacing: f32) -> f32 {
    if amount <= 0.0 {
        return 0.0;
    }

    // Walk backward recording what each window member is asked to yield.
    let mut requests = vec![0.0_f32; last + 1];
    requests[last] = amount;
    let mut start = last;
    while start > 0 {
        let gap =
            (offsets[start] - (offsets[start - 1] + heights[start - 1] + spacing)).max(0.0);
        if requests[start] <= gap {
            break;
        }
        requests[start - 1] = requests[start] - gap;
        start -= 1;
    }

    // Apply from the head of the window: each member rises by its own
    // slack plus whatever its predecessor just yielded.
    let mut moved = 0.0;
    for j in start..=last {
        moved = if j == start {
            requests[j].min(offsets[j])
        } else {
            let gap =
                (offsets[j] - (offsets[j - 1] + heights[j - 1] + spacing)).max(0.0);
            gap.min(offsets[j])
        };
        offsets[j] -= moved;
    }
    moved
}
