#![allow(dead_code)]

use async_trait::async_trait;
use image::RgbaImage;
use lopdf::{Dictionary, Document, Object, Stream};
use score_cache::*;
use score_store::MemoryStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, mpsc};

pub fn create_test_pdf(num_pages: usize, width: i64, height: i64) -> Vec<u8> {
    create_padded_pdf(num_pages, width, height, 0)
}

/// Same as [`create_test_pdf`] with an extra unreferenced stream of
/// `padding` bytes, for large-file cases
pub fn create_padded_pdf(num_pages: usize, width: i64, height: i64, padding: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..num_pages {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), b"q Q".to_vec()));
        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Resources", Object::Dictionary(Dictionary::new())),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    // MediaBox on the page tree root so pages have to inherit it
    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(height),
            ]),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    if padding > 0 {
        doc.add_object(Stream::new(Dictionary::new(), vec![b' '; padding]));
    }

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// In-memory bucket with switchable failures
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    downloads: Mutex<HashMap<String, usize>>,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
    }

    /// Make downloads of `path` fail as if the connection dropped
    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self, path: &str) {
        self.failing.lock().unwrap().remove(path);
    }

    pub fn download_count(&self, path: &str) -> usize {
        self.downloads
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn download(&self, path: &str) -> score_cache::Result<Vec<u8>> {
        *self
            .downloads
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;

        if self.failing.lock().unwrap().contains(path) {
            return Err(CacheError::NotFound(format!("{}: connection reset", path)));
        }
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(path.to_string()))
    }
}

/// Placeholder rasterizer that records which pages were rasterized
#[derive(Default)]
pub struct CountingRasterizer {
    rendered: Mutex<Vec<usize>>,
}

impl CountingRasterizer {
    pub fn rendered(&self) -> Vec<usize> {
        let mut pages = self.rendered.lock().unwrap().clone();
        pages.sort();
        pages
    }
}

impl Rasterizer for CountingRasterizer {
    fn rasterize(&self, document: &[u8], page_number: usize, scale: f32) -> score_cache::Result<RgbaImage> {
        self.rendered.lock().unwrap().push(page_number);
        PlaceholderRasterizer.rasterize(document, page_number, scale)
    }
}

/// Placeholder rasterizer that reports each start and then blocks until
/// released
pub struct GatedRasterizer {
    started: Mutex<mpsc::Sender<usize>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedRasterizer {
    pub fn new() -> (Self, mpsc::Receiver<usize>, mpsc::Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let rasterizer = Self {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        };
        (rasterizer, started_rx, release_tx)
    }
}

impl Rasterizer for GatedRasterizer {
    fn rasterize(&self, document: &[u8], page_number: usize, scale: f32) -> score_cache::Result<RgbaImage> {
        let _ = self.started.lock().unwrap().send(page_number);
        let _ = self.release.lock().unwrap().recv();
        PlaceholderRasterizer.rasterize(document, page_number, scale)
    }
}

/// Small surface so test renders stay cheap
pub fn small_metrics() -> DisplayMetrics {
    DisplayMetrics {
        width: 200.0,
        height: 100.0,
        density: 1.0,
    }
}

pub fn placeholder_renderer() -> PageRenderer {
    PageRenderer::new(Arc::new(PlaceholderRasterizer))
}

pub fn fetcher(storage: Arc<FakeStorage>, media: Arc<MemoryStore>) -> DocumentFetcher {
    DocumentFetcher::new(storage, media, placeholder_renderer())
        .with_preview_box(Size::new(40.0, 40.0))
}

/// Score with one part per entry of `parts`, uploaded to `storage` as a
/// two-page 100x100 document
pub fn upload_score(storage: &FakeStorage, score_key: &str, parts: &[&str]) -> Score {
    let parts = parts
        .iter()
        .map(|part_key| {
            let bytes = create_test_pdf(2, 100, 100);
            let part = Part::new(score_key, part_key, *part_key, bytes.len() as u64);
            storage.insert(&part.url, bytes);
            part
        })
        .collect();

    Score {
        key: score_key.to_string(),
        title: format!("Title {}", score_key),
        artist: "Composer".to_string(),
        parts,
    }
}
