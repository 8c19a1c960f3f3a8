pub mod controller;
pub mod redraw;
pub mod store;
pub mod surface;
pub mod types;
pub mod viewport;

pub use controller::{AnnotationController, SurfaceBox};
pub use redraw::{FRAME_INTERVAL, redraw_while_active};
pub use store::AnnotationStore;
pub use surface::{Composite, DrawSurface, RasterSurface, draw_instructions, flatten};
pub use types::*;
pub use viewport::Viewport;
