//! Stroke recording, undo/redo and persistence for one page at a time

use crate::store::AnnotationStore;
use crate::surface::{DrawSurface, draw_instructions};
use crate::types::*;
use crate::viewport::Viewport;
use std::sync::{Arc, Mutex, MutexGuard};

/// Pixel size of the surface a pointer event happened on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceBox {
    pub width: f32,
    pub height: f32,
}

impl SurfaceBox {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Pixel position to page fraction, clamped to the page
    pub fn normalize(&self, position: [f32; 2]) -> Point {
        let fraction = |p: f32, extent: f32| {
            if extent > 0.0 {
                (p / extent).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        [
            fraction(position[0], self.width),
            fraction(position[1], self.height),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
enum Gesture {
    Stroke { surface: SurfaceBox },
    Pan { origin: [f32; 2], start: [f32; 2] },
}

#[derive(Default)]
struct ControllerState {
    key: Option<AnnotationKey>,
    generation: u64,
    /// Saved list of the current key has been applied
    loaded: bool,
    instructions: Vec<DrawInstruction>,
    redo: Vec<DrawInstruction>,
    gesture: Option<Gesture>,
    viewport: Viewport,
}

struct ControllerInner {
    store: AnnotationStore,
    state: Mutex<ControllerState>,
}

/// Annotation state of the page currently shown.
///
/// Cheap to clone; clones share state so a redraw loop can read while pointer
/// handlers write. Only one gesture is active at a time.
#[derive(Clone)]
pub struct AnnotationController {
    inner: Arc<ControllerInner>,
}

impl AnnotationController {
    pub fn new(store: AnnotationStore) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                store,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Switch to `key` and load its saved list.
    ///
    /// History and any active gesture are dropped immediately, and edits are
    /// refused until the saved list has been applied. If another key is
    /// opened before the load finishes, the older result is ignored.
    pub async fn open(&self, key: AnnotationKey) -> Result<()> {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.key = Some(key.clone());
            state.loaded = false;
            state.instructions.clear();
            state.redo.clear();
            state.gesture = None;
            state.generation
        };

        let saved = self.inner.store.load(&key).await?;

        let mut state = self.lock();
        if state.generation == generation {
            log::debug!(
                "Loaded {} instructions for {}",
                saved.len(),
                key.storage_key()
            );
            state.instructions = saved;
            state.loaded = true;
        } else {
            log::debug!("Discarding stale load of {}", key.storage_key());
        }
        Ok(())
    }

    pub fn key(&self) -> Option<AnnotationKey> {
        self.lock().key.clone()
    }

    /// Whether the open page accepts edits
    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    pub fn instructions(&self) -> Vec<DrawInstruction> {
        self.lock().instructions.clone()
    }

    pub fn can_undo(&self) -> bool {
        !self.lock().instructions.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.lock().redo.is_empty()
    }

    /// Whether a stroke or pan is in progress
    pub fn is_active(&self) -> bool {
        self.lock().gesture.is_some()
    }

    pub fn viewport(&self) -> Viewport {
        self.lock().viewport
    }

    pub fn zoom_in(&self) {
        self.lock().viewport.zoom_in();
    }

    pub fn zoom_out(&self) {
        self.lock().viewport.zoom_out();
    }

    pub fn reset_view(&self) {
        self.lock().viewport.reset();
    }

    /// Start a gesture at `position` (pixels within `surface`).
    ///
    /// Pen and eraser start a stroke and discard the redo history; the cursor
    /// starts a pan. Ignored while another gesture is active or the page's
    /// saved list has not loaded yet. Returns whether a gesture started.
    pub fn pointer_down(
        &self,
        tool: Tool,
        color: Color,
        position: [f32; 2],
        surface: SurfaceBox,
    ) -> bool {
        let mut state = self.lock();
        if state.gesture.is_some() || !state.loaded {
            return false;
        }

        if tool.records() {
            state.redo.clear();
            state.instructions.push(DrawInstruction {
                tool,
                color,
                width: tool.default_width(),
                points: vec![surface.normalize(position)],
            });
            state.gesture = Some(Gesture::Stroke { surface });
        } else {
            let start = state.viewport.offset;
            state.gesture = Some(Gesture::Pan {
                origin: position,
                start,
            });
        }
        true
    }

    pub fn pointer_move(&self, position: [f32; 2]) {
        let mut state = self.lock();
        match state.gesture {
            Some(Gesture::Stroke { surface }) => {
                if let Some(stroke) = state.instructions.last_mut() {
                    stroke.points.push(surface.normalize(position));
                }
            }
            Some(Gesture::Pan { origin, start }) => {
                let delta = [position[0] - origin[0], position[1] - origin[1]];
                state.viewport.offset = state.viewport.panned(start, delta);
            }
            None => {}
        }
    }

    /// End the active gesture (pointer up or cancel). A finished stroke is
    /// persisted.
    pub async fn pointer_up(&self) -> Result<()> {
        let was_stroke = {
            let mut state = self.lock();
            matches!(state.gesture.take(), Some(Gesture::Stroke { .. }))
        };
        if was_stroke {
            self.persist().await?;
        }
        Ok(())
    }

    /// Move the last stroke onto the redo stack and persist. No-op when there
    /// is nothing to undo or the page is still loading.
    pub async fn undo(&self) -> Result<()> {
        let changed = {
            let mut state = self.lock();
            if !state.loaded {
                return Ok(());
            }
            match state.instructions.pop() {
                Some(last) => {
                    state.redo.push(last);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.persist().await?;
        }
        Ok(())
    }

    /// Restore the most recently undone stroke and persist. No-op when the
    /// redo stack is empty or the page is still loading.
    pub async fn redo(&self) -> Result<()> {
        let changed = {
            let mut state = self.lock();
            if !state.loaded {
                return Ok(());
            }
            match state.redo.pop() {
                Some(next) => {
                    state.instructions.push(next);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.persist().await?;
        }
        Ok(())
    }

    /// Clear `surface` and replay every instruction onto it
    pub fn render<S: DrawSurface + ?Sized>(&self, surface: &mut S, density: f32) {
        let instructions = self.instructions();
        draw_instructions(surface, &instructions, density);
    }

    async fn persist(&self) -> Result<()> {
        let (key, instructions) = {
            let state = self.lock();
            match &state.key {
                Some(key) => (key.clone(), state.instructions.clone()),
                None => return Ok(()),
            }
        };

        self.inner
            .store
            .save(&key, &instructions)
            .await
            .inspect_err(|e| log::warn!("Annotations for {} not saved: {}", key.storage_key(), e))
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
