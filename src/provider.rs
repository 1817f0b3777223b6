use std::collections::HashMap;

use crate::config::{ColumnLayout, EngineConfig};
use crate::dom::{Document, NodeId};
use crate::fonts::{TextMeasure, TextStyle};
use crate::geometry::{GeometryProvider, Rect};

const PAGE_MARGIN: f32 = 32.0;
const BASE_FONT_SIZE: f32 = 16.0;
const CODE_FONT_SIZE: f32 = 13.0;
const LINE_HEIGHT: f32 = 1.5;
const BLOCK_MARGIN: f32 = 16.0;
const CODE_PADDING: f32 = 8.0;
const MEDIA_HEIGHT: f32 = 200.0;

fn heading_scale(name: &str) -> Option<f32> {
    match name {
        "h1" => Some(2.0),
        "h2" => Some(1.6),
        "h3" => Some(1.35),
        "h4" => Some(1.2),
        "h5" => Some(1.1),
        "h6" => Some(1.0),
        _ => None,
    }
}

/// Concrete geometry for documents that are not rendered by a browser:
/// lays the main column out with a vertical cursor, wrapping inline text
/// at the column width, and records a rect for every element it passes.
/// Inline positions are line-accurate, block estimates deliberately
/// coarse; scripted providers cover the cases that need exactness.
pub struct MeasuredGeometry<M: TextMeasure> {
    measure: M,
    rects: HashMap<NodeId, Rect>,
}

struct Flow {
    left: f32,
    width: f32,
    cursor_x: f32,
    line_y: f32,
    at_line_start: bool,
}

impl Flow {
    fn line_height(&self, font_size: f32) -> f32 {
        font_size * LINE_HEIGHT
    }

    fn advance_line(&mut self, font_size: f32) {
        self.line_y += self.line_height(font_size);
        self.cursor_x = self.left;
        self.at_line_start = true;
    }
}

impl<M: TextMeasure> MeasuredGeometry<M> {
    pub fn new(measure: M) -> Self {
        Self {
            measure,
            rects: HashMap::new(),
        }
    }

    /// Lay out the container's blocks for the given viewport width,
    /// replacing any previously recorded geometry. Call again after the
    /// viewport or the content changes.
    pub fn layout_document(
        &mut self,
        doc: &Document,
        container: NodeId,
        viewport_width: f32,
        config: &EngineConfig,
    ) {
        self.rects.clear();

        let reserve = config.column_width + config.column_gutter;
        let (left_reserve, right_reserve) = match config.columns {
            ColumnLayout::Left => (reserve, 0.0),
            ColumnLayout::Right => (0.0, reserve),
            ColumnLayout::Both => (reserve, reserve),
        };
        let left = PAGE_MARGIN + left_reserve;
        let width = (viewport_width - left - right_reserve - PAGE_MARGIN).max(200.0);

        let mut y = PAGE_MARGIN;
        for &child in doc.children(container) {
            y = self.layout_block(doc, child, left, width, y);
        }
        self.rects.insert(
            container,
            Rect::new(left, PAGE_MARGIN, width, (y - PAGE_MARGIN).max(0.0)),
        );
    }

    fn layout_block(&mut self, doc: &Document, node: NodeId, left: f32, width: f32, y: f32) -> f32 {
        let Some(name) = doc.name(node) else {
            // Bare text between blocks flows like an anonymous paragraph.
            let text = doc.text_content(node);
            if text.trim().is_empty() {
                return y;
            }
            let (_, h) =
                self.measure
                    .measure_text(&text, BASE_FONT_SIZE, TextStyle::default(), Some(width));
            return y + h;
        };

        let top = y;
        let bottom = match name {
            "pre" => {
                let text = doc.text_content(node);
                let lines = text.lines().count().max(1) as f32;
                y + lines * CODE_FONT_SIZE * LINE_HEIGHT + 2.0 * CODE_PADDING
            }
            "figure" | "table" => {
                let caption = doc.text_content(node);
                let (_, caption_h) = self.measure.measure_text(
                    &caption,
                    BASE_FONT_SIZE,
                    TextStyle::default(),
                    Some(width),
                );
                y + MEDIA_HEIGHT + caption_h
            }
            "hr" => y + BLOCK_MARGIN,
            "ul" | "ol" | "blockquote" | "div" | "section" | "article" => {
                let mut cursor = y;
                for &child in doc.children(node) {
                    if doc.is_element(child) {
                        cursor = self.layout_block(doc, child, left, width, cursor);
                    }
                }
                cursor
            }
            _ => {
                let font_size = BASE_FONT_SIZE * heading_scale(name).unwrap_or(1.0);
                let style = TextStyle {
                    bold: heading_scale(name).is_some(),
                    ..TextStyle::default()
                };
                let mut flow = Flow {
                    left,
                    width,
                    cursor_x: left,
                    line_y: y,
                    at_line_start: true,
                };
                self.flow_inline(doc, node, &mut flow, font_size, style);
                flow.line_y + flow.line_height(font_size)
            }
        };

        self.rects
            .insert(node, Rect::new(left, top, width, bottom - top));
        bottom + BLOCK_MARGIN
    }

    fn flow_inline(
        &mut self,
        doc: &Document,
        node: NodeId,
        flow: &mut Flow,
        font_size: f32,
        style: TextStyle,
    ) {
        for &child in doc.children(node) {
            if let Some(text) = doc.as_text(child) {
                self.flow_text(text, flow, font_size, style);
                continue;
            }
            let name = doc.name(child).unwrap_or_default();
            let (child_size, child_style) = match name {
                "em" | "i" => (
                    font_size,
                    TextStyle {
                        italic: true,
                        ..style
                    },
                ),
                "strong" | "b" => (font_size, TextStyle { bold: true, ..style }),
                "code" => (
                    CODE_FONT_SIZE,
                    TextStyle {
                        monospace: true,
                        ..style
                    },
                ),
                "sup" | "sub" => (font_size * 0.75, style),
                _ => (font_size, style),
            };

            let start_x = flow.cursor_x;
            let start_y = flow.line_y;
            self.flow_inline(doc, child, flow, child_size, child_style);

            // The recorded rect covers the element from where it started;
            // a wrapped element extends to the line edge.
            let rect = if flow.line_y > start_y {
                Rect::new(
                    start_x,
                    start_y,
                    (flow.width + flow.left - start_x).max(1.0),
                    flow.line_y - start_y + flow.line_height(child_size),
                )
            } else {
                Rect::new(
                    start_x,
                    start_y,
                    (flow.cursor_x - start_x).max(1.0),
                    flow.line_height(child_size),
                )
            };
            self.rects.insert(child, rect);
        }
    }

    fn flow_text(&mut self, text: &str, flow: &mut Flow, font_size: f32, style: TextStyle) {
        for token in text.split_inclusive(char::is_whitespace) {
            let token = token.trim_end();
            if token.is_empty() {
                if !flow.at_line_start {
                    let (space_w, _) =
                        self.measure.measure_text(" ", font_size, style, None);
                    flow.cursor_x += space_w;
                }
                continue;
            }
            let (token_w, _) = self.measure.measure_text(token, font_size, style, None);
            if !flow.at_line_start && flow.cursor_x + token_w > flow.left + flow.width {
                flow.advance_line(font_size);
            }
            flow.cursor_x += token_w;
            flow.at_line_start = false;

            let (space_w, _) = self.measure.measure_text(" ", font_size, style, None);
            flow.cursor_x += space_w;
        }
    }
}

impl<M: TextMeasure> GeometryProvider for MeasuredGeometry<M> {
    fn rect_of(&mut self, _doc: &Document, node: NodeId) -> Option<Rect> {
        self.rects.get(&node).copied()
    }

    fn measure_box(&mut self, doc: &Document, node: NodeId, width: f32) -> f32 {
        let text = doc.text_content(node);
        let (_, height) =
            self.measure
                .measure_text(text.trim(), BASE_FONT_SIZE, TextStyle::default(), Some(width));
        height
    }
}
