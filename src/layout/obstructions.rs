use crate::dom::{Document, NodeId, SelectorList};
use crate::geometry::{GeometryProvider, Rect};

use super::types::{Cell, ObstructionRange};

/// Project every obstructing element's vertical extent into the column's
/// coordinate space. Elements inside a hidden subtree and elements the
/// provider reports as sizeless are skipped.
pub fn collect_ranges<G: GeometryProvider>(
    doc: &Document,
    geometry: &mut G,
    scope: NodeId,
    selectors: &SelectorList,
    column: &Rect,
    spacing: f32,
) -> Vec<ObstructionRange> {
    let mut ranges = Vec::new();
    for node in doc.select(scope, selectors) {
        if doc.self_or_ancestor_has_class(node, "hidden") {
            continue;
        }
        let Some(rect) = geometry.rect_of(doc, node) else {
            continue;
        };
        if rect.is_empty() {
            continue;
        }
        if rect.overlaps_horizontally(column) {
            ranges.push(ObstructionRange {
                top: rect.y - spacing - column.y,
                bottom: rect.bottom() + spacing - column.y,
            });
        }
    }
    ranges
}

/// Sort ranges and merge any that touch or overlap, then close the column
/// with a terminal range at its content height.
pub fn merge_ranges(mut ranges: Vec<ObstructionRange>, column_height: f32) -> Vec<ObstructionRange> {
    ranges.push(ObstructionRange {
        top: column_height,
        bottom: column_height,
    });
    ranges.sort_by(|a, b| a.top.total_cmp(&b.top));

    let mut merged: Vec<ObstructionRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(prev) if range.top <= prev.bottom => {
                prev.bottom = prev.bottom.max(range.bottom);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Walk the merged ranges and emit the spans between them. Degenerate
/// spans are kept; they simply never have room for anything.
pub fn partition_cells(ranges: &[ObstructionRange]) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(ranges.len());
    let mut cursor = 0.0_f32;
    for range in ranges {
        cells.push(Cell::new(cursor, range.top));
        cursor = range.bottom;
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FixedGeometry;

    #[test]
    fn merge_folds_touching_ranges() {
        let merged = merge_ranges(
            vec![
                ObstructionRange {
                    top: 300.0,
                    bottom: 400.0,
                },
                ObstructionRange {
                    top: 100.0,
                    bottom: 200.0,
                },
                ObstructionRange {
                    top: 200.0,
                    bottom: 260.0,
                },
            ],
            1000.0,
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].top, 100.0);
        assert_eq!(merged[0].bottom, 260.0);
        assert_eq!(merged[1].top, 300.0);
        assert_eq!(merged[2].top, 1000.0);
        assert_eq!(merged[2].bottom, 1000.0);
    }

    #[test]
    fn one_obstruction_splits_column_in_two() {
        // [100,200] obstruction with spacing 10 in a 1000px column
        // leaves cells [0,90] and [210,1000].
        let ranges = merge_ranges(
            vec![ObstructionRange {
                top: 90.0,
                bottom: 210.0,
            }],
            1000.0,
        );
        let cells = partition_cells(&ranges);
        assert_eq!(cells.len(), 2);
        assert_eq!((cells[0].top, cells[0].bottom), (0.0, 90.0));
        assert_eq!((cells[1].top, cells[1].bottom), (210.0, 1000.0));
        assert_eq!(cells[0].room, 90.0);
        assert_eq!(cells[1].room, 790.0);
    }

    #[test]
    fn obstruction_at_column_top_yields_degenerate_first_cell() {
        let ranges = merge_ranges(
            vec![ObstructionRange {
                top: -10.0,
                bottom: 150.0,
            }],
            600.0,
        );
        let cells = partition_cells(&ranges);
        assert_eq!(cells.len(), 2);
        assert!(cells[0].height < 0.0);
        assert!(!cells[0].can_hold(0.0));
        assert_eq!((cells[1].top, cells[1].bottom), (150.0, 600.0));
    }

    #[test]
    fn collect_projects_into_column_space_and_skips_hidden() {
        let doc = crate::dom::Document::parse(concat!(
            r#"<article id="a">"#,
            r#"<figure class="wide" id="f1"><img src="a"/></figure>"#,
            r#"<div class="hidden"><figure class="wide" id="f2"><img src="b"/></figure></div>"#,
            r#"<figure class="wide" id="f3"><img src="c"/></figure>"#,
            r#"</article>"#,
        ))
        .unwrap();

        let mut geometry = FixedGeometry::new();
        // f1 overlaps the column horizontally, f3 does not.
        geometry.set_rect("f1", Rect::new(700.0, 100.0, 500.0, 100.0));
        geometry.set_rect("f2", Rect::new(700.0, 300.0, 500.0, 100.0));
        geometry.set_rect("f3", Rect::new(100.0, 500.0, 200.0, 100.0));

        let column = Rect::new(1000.0, 50.0, 220.0, 1000.0);
        let selectors = SelectorList::parse(".wide").unwrap();
        let root = doc.root();
        let ranges = collect_ranges(&doc, &mut geometry, root, &selectors, &column, 10.0);

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].top, 100.0 - 10.0 - 50.0);
        assert_eq!(ranges[0].bottom, 200.0 + 10.0 - 50.0);
    }

    #[test]
    fn zero_size_obstruction_is_a_noop() {
        let doc = crate::dom::Document::parse(
            r#"<article><figure class="wide" id="z"><img src="a"/></figure></article>"#,
        )
        .unwrap();
        let mut geometry = FixedGeometry::new();
        geometry.set_rect("z", Rect::new(0.0, 0.0, 0.0, 0.0));
        let column = Rect::new(0.0, 0.0, 220.0, 1000.0);
        let selectors = SelectorList::parse(".wide").unwrap();
        let ranges =
            collect_ranges(&doc, &mut geometry, doc.root(), &selectors, &column, 10.0);
        assert!(ranges.is_empty());
    }
}
