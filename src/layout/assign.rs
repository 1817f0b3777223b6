use crate::config::ColumnLayout;

use super::types::{CellNote, ColumnSurface, NoteBox, Side};

/// Cell-relative offset a note wants: level with its citation, never
/// above the cell start.
pub fn default_offset(cell_top: f32, citation_y: f32) -> f32 {
    (citation_y - cell_top).max(0.0)
}

fn interval_overlap(a_start: f32, a_end: f32, b_start: f32, b_end: f32) -> f32 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// Whether a note of the given identifier may use this side. With both
/// columns enabled, even identifiers go left and odd ones go right.
pub fn side_eligible(id: u32, side: Side, layout: ColumnLayout) -> bool {
    match layout {
        ColumnLayout::Left => side == Side::Left,
        ColumnLayout::Right => side == Side::Right,
        ColumnLayout::Both => {
            if id % 2 == 0 {
                side == Side::Left
            } else {
                side == Side::Right
            }
        }
    }
}

/// Choose a cell for every note, in slice order (callers pass notes
/// sorted by identifier). Mutates the surfaces: each chosen cell records
/// the note and loses `height + spacing` of room.
///
/// Fails on the first note no cell can hold; the caller aborts the whole
/// pass on that error.
pub fn assign_notes(
    notes: &[NoteBox],
    columns: &mut [ColumnSurface],
    layout: ColumnLayout,
    spacing: f32,
) -> Result<Vec<(usize, usize)>, String> {
    let mut chosen: Vec<(usize, usize)> = Vec::with_capacity(notes.len());

    for (note_idx, note) in notes.iter().enumerate() {
        let mut best: Option<(f32, f32, usize, usize)> = None;

        for (col_idx, column) in columns.iter().enumerate() {
            if !side_eligible(note.id, column.side, layout) {
                continue;
            }
            let citation_y = note.citation.y - column.rect.y;
            let horizontal = (note.citation.center_x() - column.rect.center_x()).abs();

            for (cell_idx, cell) in column.cells.iter().enumerate() {
                if !cell.can_hold(note.height) {
                    continue;
                }

                let vertical = if citation_y >= cell.top && citation_y <= cell.bottom {
                    0.0
                } else {
                    (citation_y - cell.top)
                        .abs()
                        .min((citation_y - cell.bottom).abs())
                };

                let offset = default_offset(cell.top, citation_y);
                let crowdedness: f32 = cell
                    .notes
                    .iter()
                    .map(|cn| {
                        let other = &notes[cn.note];
                        interval_overlap(
                            offset,
                            offset + note.height + spacing,
                            cn.default_offset,
                            cn.default_offset + other.height + spacing,
                        )
                    })
                    .sum();

                let score = vertical + crowdedness;
                let candidate = (score, horizontal, col_idx, cell_idx);
                let better = match &best {
                    None => true,
                    Some((bs, bh, _, _)) => match score.total_cmp(bs) {
                        std::cmp::Ordering::Less => true,
                        std::cmp::Ordering::Greater => false,
                        std::cmp::Ordering::Equal => horizontal.total_cmp(bh).is_lt(),
                    },
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        let Some((_, _, col_idx, cell_idx)) = best else {
            return Err(format!(
                "no cell can hold sidenote {} (height {:.1})",
                note.id, note.height
            ));
        };

        let column = &mut columns[col_idx];
        let citation_y = note.citation.y - column.rect.y;
        let cell = &mut column.cells[cell_idx];
        cell.notes.push(CellNote {
            note: note_idx,
            default_offset: default_offset(cell.top, citation_y),
        });
        cell.room -= note.height + spacing;
        chosen.push((col_idx, cell_idx));
    }

    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::layout::types::Cell;

    fn column(side: Side, x: f32, cells: Vec<Cell>) -> ColumnSurface {
        ColumnSurface {
            side,
            rect: Rect::new(x, 0.0, 220.0, 1000.0),
            cells,
        }
    }

    fn note(id: u32, height: f32, citation_y: f32) -> NoteBox {
        NoteBox {
            id,
            height,
            citation: Rect::new(500.0, citation_y, 20.0, 16.0),
        }
    }

    #[test]
    fn prefers_cell_containing_the_citation() {
        let mut columns = vec![column(
            Side::Right,
            1000.0,
            vec![Cell::new(0.0, 100.0), Cell::new(120.0, 400.0)],
        )];
        let notes = vec![note(1, 50.0, 200.0)];
        let chosen = assign_notes(&notes, &mut columns, ColumnLayout::Right, 10.0).unwrap();
        assert_eq!(chosen, vec![(0, 1)]);
        assert_eq!(columns[0].cells[1].room, 280.0 - 60.0);
    }

    #[test]
    fn crowdedness_pushes_second_note_to_the_other_cell() {
        let mut columns = vec![column(
            Side::Right,
            1000.0,
            vec![Cell::new(0.0, 200.0), Cell::new(220.0, 400.0)],
        )];
        // Citation equidistant from both cells; the first note takes the
        // first cell on the tie, the second flees the projected overlap.
        let notes = vec![note(1, 50.0, 210.0), note(3, 50.0, 210.0)];
        let chosen = assign_notes(&notes, &mut columns, ColumnLayout::Right, 10.0).unwrap();
        assert_eq!(chosen[0], (0, 0));
        assert_eq!(chosen[1], (0, 1));
    }

    #[test]
    fn parity_split_across_two_columns() {
        let mut columns = vec![
            column(Side::Left, 0.0, vec![Cell::new(0.0, 1000.0)]),
            column(Side::Right, 1000.0, vec![Cell::new(0.0, 1000.0)]),
        ];
        let notes = vec![note(1, 40.0, 50.0), note(2, 40.0, 80.0), note(3, 40.0, 90.0)];
        let chosen = assign_notes(&notes, &mut columns, ColumnLayout::Both, 10.0).unwrap();
        assert_eq!(chosen[0].0, 1);
        assert_eq!(chosen[1].0, 0);
        assert_eq!(chosen[2].0, 1);
    }

    #[test]
    fn room_never_admits_an_oversized_note() {
        let mut columns = vec![column(Side::Right, 1000.0, vec![Cell::new(0.0, 100.0)])];
        let notes = vec![note(1, 60.0, 10.0), note(3, 60.0, 20.0)];
        let err = assign_notes(&notes, &mut columns, ColumnLayout::Right, 10.0).unwrap_err();
        assert!(err.contains("sidenote 3"));
        // The first assignment still landed before the abort surfaced.
        assert_eq!(columns[0].cells[0].notes.len(), 1);
        assert_eq!(columns[0].cells[0].room, 30.0);
    }

    #[test]
    fn degenerate_cells_are_never_candidates() {
        let mut columns = vec![column(
            Side::Right,
            1000.0,
            vec![Cell::new(0.0, 0.0), Cell::new(10.0, 500.0)],
        )];
        let notes = vec![note(1, 40.0, 0.0)];
        let chosen = assign_notes(&notes, &mut columns, ColumnLayout::Right, 10.0).unwrap();
        assert_eq!(chosen, vec![(0, 1)]);
    }
}
