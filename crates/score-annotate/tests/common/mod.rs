#![allow(dead_code)]

use async_trait::async_trait;
use score_annotate::*;
use score_store::{DurableStore, MemoryStore, StoreError};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Clear,
    Composite(Composite),
    Stroke(Color, f32),
    Polyline(Vec<[f32; 2]>),
}

/// Surface that records every call
pub struct RecordingSurface {
    pub width: u32,
    pub height: u32,
    pub ops: Vec<Op>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn polylines(&self) -> Vec<Vec<[f32; 2]>> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Polyline(points) => Some(points.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ops since the last clear
    pub fn last_frame(&self) -> &[Op] {
        let start = self
            .ops
            .iter()
            .rposition(|op| *op == Op::Clear)
            .unwrap_or(0);
        &self.ops[start..]
    }
}

impl DrawSurface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.ops.push(Op::Clear);
    }

    fn set_composite(&mut self, mode: Composite) {
        self.ops.push(Op::Composite(mode));
    }

    fn set_stroke(&mut self, color: Color, width: f32) {
        self.ops.push(Op::Stroke(color, width));
    }

    fn stroke_polyline(&mut self, points: &[[f32; 2]]) {
        self.ops.push(Op::Polyline(points.to_vec()));
    }
}

/// Memory store whose writes can be switched off and whose reads of chosen
/// keys wait for a signal
#[derive(Default)]
pub struct TestStore {
    pub inner: MemoryStore,
    read_only: Mutex<bool>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_read_only(&self, read_only: bool) {
        *self.read_only.lock().unwrap() = read_only;
    }

    /// Hold the next read of `key` until the returned sender fires
    pub fn gate(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(key.to_string(), rx);
        tx
    }

    /// Whether a gated read of `key` has started
    pub fn gate_taken(&self, key: &str) -> bool {
        !self.gates.lock().unwrap().contains_key(key)
    }

    fn check_writable(&self) -> score_store::Result<()> {
        if *self.read_only.lock().unwrap() {
            Err(StoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableStore for TestStore {
    async fn get(&self, key: &str) -> score_store::Result<Option<Vec<u8>>> {
        let gate = self.gates.lock().unwrap().remove(key);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> score_store::Result<()> {
        self.check_writable()?;
        self.inner.set(key, value).await
    }

    async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> score_store::Result<()> {
        self.check_writable()?;
        self.inner.set_batch(entries).await
    }

    async fn keys(&self) -> score_store::Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn remove(&self, key: &str) -> score_store::Result<()> {
        self.check_writable()?;
        self.inner.remove(key).await
    }

    async fn clear(&self) -> score_store::Result<()> {
        self.check_writable()?;
        self.inner.clear().await
    }
}

pub fn page_key(page: usize) -> AnnotationKey {
    AnnotationKey::new(Some("u1".to_string()), "s1", "p1", page)
}

pub async fn open_controller(store: Arc<TestStore>, page: usize) -> AnnotationController {
    let controller = AnnotationController::new(AnnotationStore::new(store));
    controller.open(page_key(page)).await.unwrap();
    controller
}

/// Record a pen stroke through `points` on a 100x100 surface
pub async fn draw(controller: &AnnotationController, color: Color, points: &[[f32; 2]]) {
    let surface = SurfaceBox::new(100.0, 100.0);
    assert!(controller.pointer_down(Tool::Pen, color, points[0], surface));
    for &point in &points[1..] {
        controller.pointer_move(point);
    }
    controller.pointer_up().await.unwrap();
}
