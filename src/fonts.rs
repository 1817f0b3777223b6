use std::num::NonZeroUsize;

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, Style, Weight};
use lru::LruCache;

const MEASURE_CACHE_CAP: usize = 4096;

/// Typographic variant of a measured span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextStyle {
    pub monospace: bool,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct MeasureKey {
    text: String,
    font_size_bits: u32,
    style: TextStyle,
    max_width_bits: Option<u32>,
}

/// Measures shaped text. The one seam between layout arithmetic and any
/// particular font stack.
pub trait TextMeasure {
    /// Returns (width, height). With `max_width` set the text wraps and the
    /// height covers every resulting line.
    fn measure_text(
        &mut self,
        text: &str,
        font_size: f32,
        style: TextStyle,
        max_width: Option<f32>,
    ) -> (f32, f32);
}

pub struct CosmicTextMeasure {
    font_system: FontSystem,
    cache: LruCache<MeasureKey, (f32, f32)>,
}

impl CosmicTextMeasure {
    pub fn new() -> Result<Self, String> {
        let cap = NonZeroUsize::new(MEASURE_CACHE_CAP)
            .ok_or_else(|| "measure cache capacity must be nonzero".to_string())?;
        Ok(Self {
            font_system: FontSystem::new(),
            cache: LruCache::new(cap),
        })
    }
}

impl TextMeasure for CosmicTextMeasure {
    fn measure_text(
        &mut self,
        text: &str,
        font_size: f32,
        style: TextStyle,
        max_width: Option<f32>,
    ) -> (f32, f32) {
        let key = MeasureKey {
            text: text.to_string(),
            font_size_bits: font_size.to_bits(),
            style,
            max_width_bits: max_width.map(f32::to_bits),
        };

        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }

        let line_height = font_size * 1.2;
        let mut buffer = Buffer::new(
            &mut self.font_system,
            Metrics {
                font_size,
                line_height,
            },
        );

        buffer.set_size(&mut self.font_system, max_width, None);

        let attrs = Attrs::new()
            .family(if style.monospace {
                Family::Monospace
            } else {
                Family::SansSerif
            })
            .weight(if style.bold {
                Weight::BOLD
            } else {
                Weight::NORMAL
            })
            .style(if style.italic {
                Style::Italic
            } else {
                Style::Normal
            });

        buffer.set_text(&mut self.font_system, text, &attrs, Shaping::Advanced, None);

        let mut total_width: f32 = 0.0;
        let mut total_height: f32 = 0.0;

        for run in buffer.layout_runs() {
            total_width = total_width.max(run.line_w);
            total_height += run.line_height;
        }

        let measured = (total_width, total_height);
        self.cache.put(key, measured);
        measured
    }
}

/// Deterministic character-cell measurer for tests: every glyph is
/// `font_size * 0.5` wide, lines are `font_size * 1.2` tall.
#[cfg(test)]
pub struct MonowidthMeasure;

#[cfg(test)]
impl TextMeasure for MonowidthMeasure {
    fn measure_text(
        &mut self,
        text: &str,
        font_size: f32,
        _style: TextStyle,
        max_width: Option<f32>,
    ) -> (f32, f32) {
        let glyph_w = font_size * 0.5;
        let line_h = font_size * 1.2;
        let chars = text.chars().count().max(1) as f32;
        let natural = chars * glyph_w;
        match max_width {
            Some(w) if natural > w && w > glyph_w => {
                let per_line = (w / glyph_w).floor().max(1.0);
                let lines = (chars / per_line).ceil();
                (per_line * glyph_w, lines * line_h)
            }
            _ => (natural, line_h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monowidth_wraps_to_extra_lines() {
        let mut m = MonowidthMeasure;
        let (w, h) = m.measure_text("abcdefghij", 10.0, TextStyle::default(), Some(25.0));
        // 5px glyphs, 5 per line, 10 chars -> 2 lines of 12px
        assert_eq!(w, 25.0);
        assert_eq!(h, 24.0);
    }

    #[test]
    fn monowidth_single_line_without_cap() {
        let mut m = MonowidthMeasure;
        let (w, h) = m.measure_text("abcd", 10.0, TextStyle::default(), None);
        assert_eq!(w, 20.0);
        assert_eq!(h, 12.0);
    }
}
