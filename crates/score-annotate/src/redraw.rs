use crate::controller::AnnotationController;
use crate::surface::DrawSurface;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};

/// Default frame interval of the redraw loop (about 60 Hz)
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Redraw `surface` once per frame while a gesture is active, then draw one
/// final frame after it ends. Returns the number of frames drawn.
pub async fn redraw_while_active<S: DrawSurface + ?Sized>(
    controller: &AnnotationController,
    surface: &mut S,
    density: f32,
    frame: Duration,
) -> usize {
    let mut ticker = interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut frames = 0;
    loop {
        ticker.tick().await;
        let active = controller.is_active();
        controller.render(surface, density);
        frames += 1;
        if !active {
            return frames;
        }
    }
}
