/// Zoom step applied by [`Viewport::zoom_in`] and [`Viewport::zoom_out`]
pub const ZOOM_STEP: f32 = 0.5;

/// Zoom and pan of the annotated page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub zoom: f32,
    /// Pan offset in surface pixels at zoom 1
    pub offset: [f32; 2],
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset: [0.0, 0.0],
        }
    }
}

impl Viewport {
    pub fn zoom_in(&mut self) {
        self.zoom += ZOOM_STEP;
    }

    /// Never goes below 1
    pub fn zoom_out(&mut self) {
        if self.zoom > 1.0 {
            self.zoom = (self.zoom - ZOOM_STEP).max(1.0);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Offset after dragging by `delta` screen pixels from `start`
    pub fn panned(&self, start: [f32; 2], delta: [f32; 2]) -> [f32; 2] {
        [start[0] + delta[0] / self.zoom, start[1] + delta[1] / self.zoom]
    }
}
