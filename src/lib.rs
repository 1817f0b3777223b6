pub mod config;
pub mod dom;
pub mod engine;
pub mod fonts;
pub mod geometry;
pub mod layout;
pub mod provider;

pub use config::{ColumnLayout, EngineConfig};
pub use engine::{EngineState, LayoutReport, MarginEngine, ScrollRequest};
pub use geometry::{FixedGeometry, GeometryProvider, Rect, Viewport};
