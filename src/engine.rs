use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{ColumnLayout, EngineConfig};
use crate::dom::{Document, NodeId, SelectorList};
use crate::geometry::{GeometryProvider, Rect, Viewport};
use crate::layout::{
    ColumnSurface, NoteBox, Placement, Side, assign_notes, collect_ranges, merge_ranges,
    partition_cells, resolve_cell,
};

pub const CITATION_ID_PREFIX: &str = "fnref";
pub const FOOTNOTE_ID_PREFIX: &str = "fn";
pub const ANNOTATION_ID_PREFIX: &str = "sn";

const CLASS_HIDDEN: &str = "hidden";
const CLASS_CUT_OFF: &str = "cut-off";
const CLASS_ENGAGED: &str = "engaged";
const CLASS_HIGHLIGHTED: &str = "highlighted";
const CLASS_TARGETED: &str = "targeted";
const CLASS_POSITION_ADJUSTED: &str = "position-adjusted";
const CLASS_MARGIN_INLINE: &str = "margin-notes-inline";

/// Whether the side columns currently exist in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Deconstructed,
    Constructed,
}

#[derive(Debug)]
struct Annotation {
    id: u32,
    node: NodeId,
    citation: NodeId,
    /// Rendered box height (natural height capped at the configured max).
    height: f32,
    natural_height: f32,
    cut_off: bool,
    placement: Option<Placement>,
}

#[derive(Debug, Clone, Copy)]
struct ColumnNode {
    side: Side,
    node: NodeId,
}

/// State held for the duration of one hover gesture.
#[derive(Debug, Clone, Copy)]
struct InteractionState {
    id: u32,
    original_offset: f32,
}

#[derive(Debug, Default)]
struct Schedule {
    queued: bool,
    deadline: Option<Instant>,
}

/// What the host should do after a citation is activated: set the
/// location fragment and smooth-scroll to the target position.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollRequest {
    pub fragment: String,
    pub target_top: f32,
}

#[derive(Debug, Serialize)]
pub struct CellReport {
    pub top: f32,
    pub bottom: f32,
    pub room: f32,
}

#[derive(Debug, Serialize)]
pub struct ColumnReport {
    pub side: Side,
    pub rect: Rect,
    pub cells: Vec<CellReport>,
}

#[derive(Debug, Serialize)]
pub struct NoteReport {
    pub id: u32,
    pub side: Option<Side>,
    pub offset: Option<f32>,
    pub height: f32,
    pub cut_off: bool,
}

#[derive(Debug, Serialize)]
pub struct LayoutReport {
    pub constructed: bool,
    pub columns: Vec<ColumnReport>,
    pub notes: Vec<NoteReport>,
}

/// The margin-annotation engine: owns its columns, the citation ↔
/// annotation correspondence, and all placement state for one document.
#[derive(Debug)]
pub struct MarginEngine<G: GeometryProvider> {
    config: EngineConfig,
    doc: Document,
    geometry: G,
    state: EngineState,
    container: NodeId,
    columns: Vec<ColumnNode>,
    notes: Vec<Annotation>,
    viewport: Viewport,
    schedule: Schedule,
    hover: Option<InteractionState>,
    targeted: Option<(u32, Instant)>,
    surfaces: Vec<ColumnSurface>,

    citation_sel: SelectorList,
    margin_note_sel: SelectorList,
    obstruction_sel: SelectorList,
}

impl<G: GeometryProvider> MarginEngine<G> {
    /// Fails when the configured container matches nothing; the engine
    /// stays inert in that case and is not retried.
    pub fn new(doc: Document, geometry: G, config: EngineConfig) -> Result<Self, String> {
        let container_sel = SelectorList::parse(&config.container)
            .map_err(|e| format!("bad container selector: {}", e))?;
        let citation_sel = SelectorList::parse(&config.citation_selector)
            .map_err(|e| format!("bad citation selector: {}", e))?;
        let margin_note_sel = SelectorList::parse(&config.margin_note_selectors)
            .map_err(|e| format!("bad margin-note selector: {}", e))?;
        let obstruction_sel = SelectorList::parse(&config.obstruction_selectors)
            .map_err(|e| format!("bad obstruction selector: {}", e))?;
        // The footnote selector is part of the configuration contract even
        // though lookup goes through the id convention; validate it early.
        SelectorList::parse(&config.footnote_selector)
            .map_err(|e| format!("bad footnote selector: {}", e))?;

        let Some(container) = doc.select(doc.root(), &container_sel).into_iter().next() else {
            log::error!("container '{}' not found; engine inactive", config.container);
            return Err(format!("container '{}' not found", config.container));
        };

        Ok(Self {
            config,
            doc,
            geometry,
            state: EngineState::Deconstructed,
            container,
            columns: Vec::new(),
            notes: Vec::new(),
            viewport: Viewport::default(),
            schedule: Schedule::default(),
            hover: None,
            targeted: None,
            surfaces: Vec::new(),
            citation_sel,
            margin_note_sel,
            obstruction_sel,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The document provider mutates content through here, then calls
    /// [`MarginEngine::notify_content_changed`].
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn annotation_ids(&self) -> Vec<u32> {
        self.notes.iter().map(|n| n.id).collect()
    }

    pub fn pending_update(&self) -> bool {
        self.schedule.queued
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.deadline.filter(|_| self.schedule.queued)
    }

    /// Deliver a viewport size change. Crossing the sidenote breakpoint
    /// constructs or deconstructs; inside the constructed state a resize
    /// only schedules a debounced re-layout.
    pub fn handle_viewport_change(&mut self, viewport: Viewport, now: Instant) {
        self.viewport = viewport;
        self.apply_margin_note_breakpoint();
        match self.state {
            EngineState::Deconstructed => {
                if viewport.width >= self.config.sidenote_breakpoint {
                    self.construct();
                }
            }
            EngineState::Constructed => {
                if viewport.width < self.config.sidenote_breakpoint {
                    self.deconstruct();
                } else {
                    self.schedule_relayout(now);
                }
            }
        }
    }

    /// Scroll only updates the stored viewport and schedules; it never
    /// changes state.
    pub fn handle_scroll(&mut self, viewport: Viewport, now: Instant) {
        self.viewport = viewport;
        if self.state == EngineState::Constructed {
            self.schedule_relayout(now);
        }
    }

    /// Explicit entry point for the document provider after it inserts
    /// new content. Replaces ambient mutation observation.
    pub fn notify_content_changed(&mut self, now: Instant) {
        if self.state == EngineState::Constructed {
            self.schedule_relayout(now);
        }
    }

    /// The host's idle-time callback. Runs the coalesced re-layout once
    /// the debounce quiet period has elapsed, and expires the transient
    /// targeted flag. Returns whether a layout pass ran.
    pub fn run_pending(&mut self, now: Instant) -> bool {
        if let Some((id, until)) = self.targeted {
            if now >= until {
                if let Some(i) = self.note_index(id) {
                    let node = self.notes[i].node;
                    self.doc.remove_class(node, CLASS_TARGETED);
                }
                self.targeted = None;
            }
        }

        let due = self.schedule.queued && self.schedule.deadline.is_some_and(|d| now >= d);
        if due {
            self.schedule.queued = false;
            self.schedule.deadline = None;
            self.relayout();
        }
        due
    }

    fn schedule_relayout(&mut self, now: Instant) {
        // Trailing-edge debounce: every event pushes the deadline out,
        // and the queued flag coalesces concurrent requests.
        self.schedule.deadline = Some(now + Duration::from_millis(self.config.debounce_ms));
        self.schedule.queued = true;
    }

    fn construct(&mut self) {
        self.state = EngineState::Constructed;
        let sides: &[Side] = match self.config.columns {
            ColumnLayout::Left => &[Side::Left],
            ColumnLayout::Right => &[Side::Right],
            ColumnLayout::Both => &[Side::Left, Side::Right],
        };
        for &side in sides {
            let node = self.doc.create_element("div");
            let suffix = match side {
                Side::Left => "left",
                Side::Right => "right",
            };
            self.doc
                .set_attr(node, "id", &format!("sidenote-column-{}", suffix));
            self.doc.set_attr(
                node,
                "class",
                &format!("sidenote-column sidenote-column-{} {}", suffix, CLASS_HIDDEN),
            );
            self.doc.append_child(self.container, node);
            self.columns.push(ColumnNode { side, node });
        }

        // Columns stay hidden until the first layout completes, so the
        // reader never sees unpositioned boxes.
        self.relayout();
        for column in &self.columns {
            self.doc.remove_class(column.node, CLASS_HIDDEN);
        }
    }

    fn deconstruct(&mut self) {
        for i in 0..self.notes.len() {
            let node = self.notes[i].node;
            self.doc.detach(node);
        }
        self.notes.clear();
        for i in 0..self.columns.len() {
            let node = self.columns[i].node;
            self.doc.detach(node);
        }
        self.columns.clear();
        self.surfaces.clear();
        self.schedule = Schedule::default();
        self.hover = None;
        self.targeted = None;
        self.state = EngineState::Deconstructed;
    }

    fn apply_margin_note_breakpoint(&mut self) {
        let inline = self.viewport.width < self.config.margin_note_breakpoint;
        let root = self.doc.root();
        for node in self.doc.select(root, &self.margin_note_sel) {
            if inline {
                self.doc.add_class(node, CLASS_MARGIN_INLINE);
            } else {
                self.doc.remove_class(node, CLASS_MARGIN_INLINE);
            }
        }
    }

    fn note_index(&self, id: u32) -> Option<usize> {
        self.notes.binary_search_by_key(&id, |n| n.id).ok()
    }

    fn citation_identifier(raw: &str) -> Option<u32> {
        raw.strip_prefix(CITATION_ID_PREFIX)
            .and_then(|s| s.parse::<u32>().ok())
    }

    /// Discover citations, pair each new one with its footnote, and build
    /// the annotation boxes. Citations whose footnote is missing are
    /// skipped with a warning. Also sweeps annotations whose citation has
    /// left the document, so no orphan survives a pass.
    fn refresh_correspondence(&mut self) {
        let mut removed: Vec<NodeId> = Vec::new();
        let container = self.container;
        let doc = &self.doc;
        self.notes.retain(|note| {
            let mut cursor = Some(note.citation);
            let mut attached = false;
            while let Some(n) = cursor {
                if n == container {
                    attached = true;
                    break;
                }
                cursor = doc.parent(n);
            }
            if !attached {
                removed.push(note.node);
            }
            attached
        });
        for node in removed {
            self.doc.detach(node);
        }

        let citations = self.doc.select(self.container, &self.citation_sel);
        // The note vector is out of id order while this loop appends;
        // membership checks go through the set, not note_index.
        let mut seen: HashSet<u32> = self.notes.iter().map(|n| n.id).collect();
        for citation in citations {
            let Some(raw_id) = self.doc.attr(citation, "id") else {
                continue;
            };
            let Some(id) = Self::citation_identifier(raw_id) else {
                log::warn!(
                    "citation id '{}' does not follow the {}<n> convention; skipping",
                    raw_id,
                    CITATION_ID_PREFIX
                );
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            let footnote_id = format!("{}{}", FOOTNOTE_ID_PREFIX, id);
            let Some(footnote) = self.doc.find_by_id(&footnote_id) else {
                log::warn!("no footnote definition '{}' for citation {}; skipping", footnote_id, id);
                continue;
            };
            let node = self.build_annotation(id, footnote);
            self.notes.push(Annotation {
                id,
                node,
                citation,
                height: 0.0,
                natural_height: 0.0,
                cut_off: false,
                placement: None,
            });
        }

        self.notes.sort_by_key(|n| n.id);
    }

    fn build_annotation(&mut self, id: u32, footnote: NodeId) -> NodeId {
        let aside = self.doc.create_element("aside");
        self.doc
            .set_attr(aside, "id", &format!("{}{}", ANNOTATION_ID_PREFIX, id));
        self.doc
            .set_attr(aside, "class", &format!("sidenote {}", CLASS_HIDDEN));

        let link = self.doc.create_element("a");
        self.doc.set_attr(link, "class", "sidenote-self-link");
        self.doc
            .set_attr(link, "href", &format!("#{}{}", ANNOTATION_ID_PREFIX, id));
        self.doc
            .set_attr(link, "title", &format!("Link to sidenote {}", id));
        let label = self.doc.create_text(&id.to_string());
        self.doc.append_child(link, label);
        self.doc.append_child(aside, link);

        // Clone the footnote body, leaving out the return link and any
        // self-link the footnote carries.
        self.doc.clone_children_into(footnote, aside, &|d, n| {
            d.is_element(n)
                && (d.has_class(n, "footnote-back") || d.has_class(n, "footnote-self-link"))
        });

        if let Some(first_column) = self.columns.first() {
            self.doc.append_child(first_column.node, aside);
        }
        aside
    }

    fn column_rect(&self, side: Side, container: &Rect) -> Rect {
        let width = self.config.column_width;
        let gutter = self.config.column_gutter;
        match side {
            Side::Left => Rect::new(container.x - gutter - width, container.y, width, container.height),
            Side::Right => Rect::new(container.right() + gutter, container.y, width, container.height),
        }
    }

    /// One full pass: refresh the correspondence, rebuild the placement
    /// surface, assign every annotation, resolve offsets, and write the
    /// results into the document. Always runs to completion against the
    /// document as it stands when the pass begins.
    fn relayout(&mut self) {
        if self.state != EngineState::Constructed {
            return;
        }
        self.refresh_correspondence();

        let Some(container_rect) = self.geometry.rect_of(&self.doc, self.container) else {
            log::warn!("container has no geometry; skipping layout pass");
            return;
        };

        let mut surfaces: Vec<ColumnSurface> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let rect = self.column_rect(column.side, &container_rect);
            let root = self.doc.root();
            let ranges = collect_ranges(
                &self.doc,
                &mut self.geometry,
                root,
                &self.obstruction_sel,
                &rect,
                self.config.spacing,
            );
            let merged = merge_ranges(ranges, rect.height);
            let cells = partition_cells(&merged);
            surfaces.push(ColumnSurface {
                side: column.side,
                rect,
                cells,
            });
        }

        let content_width = (self.config.column_width - 2.0 * self.config.box_padding).max(1.0);
        for i in 0..self.notes.len() {
            let node = self.notes[i].node;
            let natural =
                self.geometry.measure_box(&self.doc, node, content_width) + 2.0 * self.config.box_padding;
            let note = &mut self.notes[i];
            note.natural_height = natural;
            note.height = natural.min(self.config.annotation_max_height);
            note.cut_off = note.natural_height > note.height + 0.5;
        }

        // Annotations whose citation has no geometry are left out of the
        // pass and hidden; a sizeless citation is a no-op, not an error.
        let mut boxes: Vec<NoteBox> = Vec::with_capacity(self.notes.len());
        let mut box_to_note: Vec<usize> = Vec::with_capacity(self.notes.len());
        for i in 0..self.notes.len() {
            let citation = self.notes[i].citation;
            match self.geometry.rect_of(&self.doc, citation) {
                Some(rect) if !rect.is_empty() => {
                    boxes.push(NoteBox {
                        id: self.notes[i].id,
                        height: self.notes[i].height,
                        citation: rect,
                    });
                    box_to_note.push(i);
                }
                _ => {
                    let node = self.notes[i].node;
                    self.doc.add_class(node, CLASS_HIDDEN);
                    self.notes[i].placement = None;
                }
            }
        }

        if let Err(message) =
            assign_notes(&boxes, &mut surfaces, self.config.columns, self.config.spacing)
        {
            self.abort_pass(&message);
            return;
        }

        for surface in &surfaces {
            let column_node = self
                .columns
                .iter()
                .find(|c| c.side == surface.side)
                .map(|c| c.node);
            for (cell_idx, cell) in surface.cells.iter().enumerate() {
                if cell.notes.is_empty() {
                    continue;
                }
                let resolved = resolve_cell(
                    cell,
                    &boxes,
                    &surface.rect,
                    self.config.spacing,
                    self.config.offset_bias,
                );
                for r in resolved {
                    let note = &mut self.notes[box_to_note[r.note]];
                    let offset = cell.top + r.offset;
                    note.placement = Some(Placement {
                        side: surface.side,
                        cell: cell_idx,
                        offset,
                    });
                    let node = note.node;
                    let cut_off = note.cut_off;
                    if let Some(column_node) = column_node {
                        self.doc.append_child(column_node, node);
                    }
                    self.doc.set_style(node, "top", &format!("{:.2}px", offset));
                    self.doc.remove_class(node, CLASS_HIDDEN);
                    if cut_off {
                        self.doc.add_class(node, CLASS_CUT_OFF);
                    } else {
                        self.doc.remove_class(node, CLASS_CUT_OFF);
                    }
                }
            }
        }

        self.surfaces = surfaces;
        log::debug!(
            "layout pass placed {} of {} sidenotes",
            boxes.len(),
            self.notes.len()
        );
    }

    /// Fail-soft degradation: drop every annotation box and leave the
    /// citations behaving as ordinary footnote links.
    fn abort_pass(&mut self, message: &str) {
        log::warn!("sidenote layout aborted: {}; removing all annotations", message);
        for i in 0..self.notes.len() {
            let node = self.notes[i].node;
            self.doc.detach(node);
        }
        self.notes.clear();
        self.surfaces.clear();
        self.hover = None;
        self.targeted = None;
    }

    fn placement_geometry(&self, index: usize) -> Option<(Placement, Rect)> {
        let placement = self.notes[index].placement?;
        let rect = self
            .surfaces
            .iter()
            .find(|s| s.side == placement.side)
            .map(|s| s.rect)?;
        Some((placement, rect))
    }

    /// Hover/focus entry for an annotation or its citation: highlight
    /// both ends and nudge the annotation into the viewport if needed.
    pub fn pointer_enter(&mut self, id: u32) {
        if self.state != EngineState::Constructed {
            return;
        }
        let Some(index) = self.note_index(id) else {
            return;
        };
        let note_node = self.notes[index].node;
        let citation_node = self.notes[index].citation;
        self.doc.add_class(note_node, CLASS_HIGHLIGHTED);
        self.doc.add_class(citation_node, CLASS_HIGHLIGHTED);
        self.doc.add_class(citation_node, CLASS_ENGAGED);

        let Some((placement, column)) = self.placement_geometry(index) else {
            return;
        };
        let top = column.y + placement.offset;
        let bottom = top + self.notes[index].height;
        let padding = self.config.hover_padding;

        let delta = if top < self.viewport.top() {
            self.viewport.top() - top + padding
        } else if bottom > self.viewport.bottom() {
            // Slide up, but never past the annotation's own top bound.
            (-(bottom - self.viewport.bottom() + padding)).max(-placement.offset)
        } else {
            0.0
        };

        if delta != 0.0 && self.hover.is_none() {
            self.hover = Some(InteractionState {
                id,
                original_offset: placement.offset,
            });
            self.doc
                .set_style(note_node, "top", &format!("{:.2}px", placement.offset + delta));
            self.doc.add_class(note_node, CLASS_POSITION_ADJUSTED);
        }
    }

    /// Hover/focus exit: clear the shared highlight and restore the
    /// pre-adjustment offset exactly.
    pub fn pointer_leave(&mut self, id: u32) {
        if self.state != EngineState::Constructed {
            return;
        }
        let Some(index) = self.note_index(id) else {
            return;
        };
        let note_node = self.notes[index].node;
        let citation_node = self.notes[index].citation;
        self.doc.remove_class(note_node, CLASS_HIGHLIGHTED);
        self.doc.remove_class(citation_node, CLASS_HIGHLIGHTED);
        self.doc.remove_class(citation_node, CLASS_ENGAGED);

        if let Some(hover) = self.hover.take() {
            if hover.id == id {
                self.doc
                    .set_style(note_node, "top", &format!("{:.2}px", hover.original_offset));
                self.doc.remove_class(note_node, CLASS_POSITION_ADJUSTED);
            } else {
                self.hover = Some(hover);
            }
        }
    }

    /// Citation click while constructed: the default navigation is
    /// suppressed by the caller; the engine answers with the fragment to
    /// set and the position to smooth-scroll to, and marks the annotation
    /// targeted for a fixed duration.
    pub fn activate_citation(&mut self, id: u32, now: Instant) -> Option<ScrollRequest> {
        if self.state != EngineState::Constructed {
            return None;
        }
        let index = self.note_index(id)?;
        let (placement, column) = self.placement_geometry(index)?;

        if let Some((previous, _)) = self.targeted.take() {
            if let Some(prev_index) = self.note_index(previous) {
                let node = self.notes[prev_index].node;
                self.doc.remove_class(node, CLASS_TARGETED);
            }
        }
        let node = self.notes[index].node;
        self.doc.add_class(node, CLASS_TARGETED);
        self.targeted = Some((
            id,
            now + Duration::from_millis(self.config.targeted_duration_ms),
        ));

        Some(ScrollRequest {
            fragment: format!("{}{}", ANNOTATION_ID_PREFIX, id),
            target_top: column.y + placement.offset - self.config.scroll_padding,
        })
    }

    pub fn layout_report(&self) -> LayoutReport {
        LayoutReport {
            constructed: self.state == EngineState::Constructed,
            columns: self
                .surfaces
                .iter()
                .map(|s| ColumnReport {
                    side: s.side,
                    rect: s.rect,
                    cells: s
                        .cells
                        .iter()
                        .map(|c| CellReport {
                            top: c.top,
                            bottom: c.bottom,
                            room: c.room,
                        })
                        .collect(),
                })
                .collect(),
            notes: self
                .notes
                .iter()
                .map(|n| NoteReport {
                    id: n.id,
                    side: n.placement.map(|p| p.side),
                    offset: n.placement.map(|p| p.offset),
                    height: n.height,
                    cut_off: n.cut_off,
                })
                .collect(),
        }
    }
}
