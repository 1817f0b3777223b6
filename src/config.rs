use serde::{Deserialize, Serialize};

const CONTAINER: &str = "article";
const CITATION_SELECTOR: &str = ".footnote-ref";
const FOOTNOTE_SELECTOR: &str = ".footnote";
const OBSTRUCTION_SELECTORS: &str = ".wide, figure.wide, table, pre.wide";
const MARGIN_NOTE_SELECTORS: &str = ".margin-note";

const SPACING: f32 = 10.0;
const BOX_PADDING: f32 = 8.0;
const OFFSET_BIAS: f32 = 0.0;
const ANNOTATION_MAX_HEIGHT: f32 = 600.0;
const COLUMN_WIDTH: f32 = 220.0;
const COLUMN_GUTTER: f32 = 24.0;
const HOVER_PADDING: f32 = 12.0;
const SCROLL_PADDING: f32 = 16.0;

// Both breakpoints must equal the values the paired stylesheet uses for
// hiding/showing inline vs margin rendering.
const SIDENOTE_BREAKPOINT: f32 = 1280.0;
const MARGIN_NOTE_BREAKPOINT: f32 = 1000.0;

const DEBOUNCE_MS: u64 = 120;
const TARGETED_DURATION_MS: u64 = 1500;

/// Which side columns the engine builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnLayout {
    Left,
    Right,
    /// Both columns, annotations split by identifier parity.
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root element scanned for citations and footnotes.
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_citation_selector")]
    pub citation_selector: String,
    #[serde(default = "default_footnote_selector")]
    pub footnote_selector: String,
    /// Elements that may visually intersect a side column.
    #[serde(default = "default_obstruction_selectors")]
    pub obstruction_selectors: String,
    /// Containers whose short notes render inline below the margin-note
    /// breakpoint.
    #[serde(default = "default_margin_note_selectors")]
    pub margin_note_selectors: String,

    #[serde(default = "default_spacing")]
    pub spacing: f32,
    #[serde(default = "default_box_padding")]
    pub box_padding: f32,
    #[serde(default = "default_offset_bias")]
    pub offset_bias: f32,
    #[serde(default = "default_annotation_max_height")]
    pub annotation_max_height: f32,
    #[serde(default = "default_column_width")]
    pub column_width: f32,
    #[serde(default = "default_column_gutter")]
    pub column_gutter: f32,
    #[serde(default = "default_hover_padding")]
    pub hover_padding: f32,
    #[serde(default = "default_scroll_padding")]
    pub scroll_padding: f32,

    #[serde(default = "default_sidenote_breakpoint")]
    pub sidenote_breakpoint: f32,
    #[serde(default = "default_margin_note_breakpoint")]
    pub margin_note_breakpoint: f32,

    #[serde(default = "default_columns")]
    pub columns: ColumnLayout,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_targeted_duration_ms")]
    pub targeted_duration_ms: u64,
}

fn default_container() -> String {
    CONTAINER.to_string()
}
fn default_citation_selector() -> String {
    CITATION_SELECTOR.to_string()
}
fn default_footnote_selector() -> String {
    FOOTNOTE_SELECTOR.to_string()
}
fn default_obstruction_selectors() -> String {
    OBSTRUCTION_SELECTORS.to_string()
}
fn default_margin_note_selectors() -> String {
    MARGIN_NOTE_SELECTORS.to_string()
}
fn default_spacing() -> f32 {
    SPACING
}
fn default_box_padding() -> f32 {
    BOX_PADDING
}
fn default_offset_bias() -> f32 {
    OFFSET_BIAS
}
fn default_annotation_max_height() -> f32 {
    ANNOTATION_MAX_HEIGHT
}
fn default_column_width() -> f32 {
    COLUMN_WIDTH
}
fn default_column_gutter() -> f32 {
    COLUMN_GUTTER
}
fn default_hover_padding() -> f32 {
    HOVER_PADDING
}
fn default_scroll_padding() -> f32 {
    SCROLL_PADDING
}
fn default_sidenote_breakpoint() -> f32 {
    SIDENOTE_BREAKPOINT
}
fn default_margin_note_breakpoint() -> f32 {
    MARGIN_NOTE_BREAKPOINT
}
fn default_columns() -> ColumnLayout {
    ColumnLayout::Both
}
fn default_debounce_ms() -> u64 {
    DEBOUNCE_MS
}
fn default_targeted_duration_ms() -> u64 {
    TARGETED_DURATION_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            container: default_container(),
            citation_selector: default_citation_selector(),
            footnote_selector: default_footnote_selector(),
            obstruction_selectors: default_obstruction_selectors(),
            margin_note_selectors: default_margin_note_selectors(),
            spacing: SPACING,
            box_padding: BOX_PADDING,
            offset_bias: OFFSET_BIAS,
            annotation_max_height: ANNOTATION_MAX_HEIGHT,
            column_width: COLUMN_WIDTH,
            column_gutter: COLUMN_GUTTER,
            hover_padding: HOVER_PADDING,
            scroll_padding: SCROLL_PADDING,
            sidenote_breakpoint: SIDENOTE_BREAKPOINT,
            margin_note_breakpoint: MARGIN_NOTE_BREAKPOINT,
            columns: ColumnLayout::Both,
            debounce_ms: DEBOUNCE_MS,
            targeted_duration_ms: TARGETED_DURATION_MS,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse TOML config: {}", e))
    }

    pub fn from_yaml(content: &str) -> Result<Self, String> {
        serde_yaml::from_str(content).map_err(|e| format!("Failed to parse YAML config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnLayout, EngineConfig};

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = EngineConfig::from_toml(
            r#"
spacing = 16.0
columns = "left"
"#,
        )
        .expect("partial config");
        assert_eq!(cfg.spacing, 16.0);
        assert_eq!(cfg.columns, ColumnLayout::Left);
        assert_eq!(cfg.container, "article");
        assert_eq!(cfg.sidenote_breakpoint, 1280.0);
    }

    #[test]
    fn yaml_and_toml_agree_on_defaults() {
        let toml = EngineConfig::from_toml("").expect("empty toml");
        let yaml = EngineConfig::from_yaml("{}").expect("empty yaml");
        assert_eq!(toml.column_width, yaml.column_width);
        assert_eq!(toml.debounce_ms, yaml.debounce_ms);
    }

    #[test]
    fn bad_column_value_is_an_error() {
        assert!(EngineConfig::from_toml(r#"columns = "middle""#).is_err());
    }
}
