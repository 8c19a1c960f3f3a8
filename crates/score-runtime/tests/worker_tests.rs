use lopdf::{Dictionary, Document, Object, Stream};
use score_cache::{Liveness, ObjectStorage, Part};
use score_runtime::*;
use score_store::MemoryStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Remote whose downloads never complete
struct StalledStorage;

#[async_trait::async_trait]
impl ObjectStorage for StalledStorage {
    async fn download(&self, _path: &str) -> score_cache::Result<Vec<u8>> {
        std::future::pending().await
    }
}

fn create_test_pdf(num_pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..num_pages {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), b"q Q".to_vec()));
        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(100),
                    Object::Integer(100),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(num_pages as i64)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn upload(mirror: &Path, part: &Part, pages: usize) {
    let path = mirror.join(&part.url);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, create_test_pdf(pages)).unwrap();
}

fn score(key: &str, parts: Vec<Part>) -> Score {
    Score {
        key: key.to_string(),
        title: format!("Title {}", key),
        artist: String::new(),
        parts,
    }
}

fn services(mirror: &Path) -> ReaderServices {
    let storage = remote_storage(&RemoteSource::Directory {
        path: mirror.to_path_buf(),
    });
    services_with(storage)
}

fn services_with(storage: Arc<dyn ObjectStorage>) -> ReaderServices {
    let mut config = ReaderConfig::default();
    config.display = score_cache::DisplayMetrics {
        width: 200.0,
        height: 100.0,
        density: 1.0,
    };
    config.preview_box = score_cache::Size::new(40.0, 40.0);
    config.user_id = Some("u1".to_string());

    let stores = Stores {
        media: Arc::new(MemoryStore::new()),
        annotations: Arc::new(MemoryStore::new()),
        pinned: Arc::new(MemoryStore::new()),
    };
    ReaderServices::assemble(config, stores, storage, placeholder_rasterizer())
}

/// Receive updates until one matches, returning everything received
async fn collect_until(
    rx: &mut mpsc::UnboundedReceiver<ReaderUpdate>,
    done: impl Fn(&ReaderUpdate) -> bool,
) -> Vec<ReaderUpdate> {
    let mut received = Vec::new();
    while let Some(update) = rx.recv().await {
        let finished = done(&update);
        received.push(update);
        if finished {
            break;
        }
    }
    received
}

fn is_pass_finished(update: &ReaderUpdate) -> bool {
    matches!(update, ReaderUpdate::PassFinished { .. })
}

#[tokio::test]
async fn test_document_set_starts_a_pass() {
    let mirror = TempDir::new().unwrap();
    let part = Part::new("s1", "violin", "Violin", 0);
    upload(mirror.path(), &part, 2);
    let services = services(mirror.path());
    let states = services.coordinator.states().clone();

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(worker_task(command_rx, update_tx, services));

    command_tx
        .send(ReaderCommand::SetDocuments {
            scores: vec![score("s1", vec![part])],
        })
        .unwrap();

    let updates = collect_until(&mut update_rx, is_pass_finished).await;
    assert!(updates.iter().any(|u| matches!(
        u,
        ReaderUpdate::Progress { current: 1, total: 1, score_key, .. } if score_key == "s1"
    )));
    match updates.last() {
        Some(ReaderUpdate::PassFinished { report }) => assert_eq!(report.succeeded, 1),
        other => panic!("unexpected update {:?}", other),
    }
    assert_eq!(states.get("s1"), Some(CacheState::Success));

    drop(command_tx);
    worker.await.unwrap();
}

#[tokio::test]
async fn test_failed_part_is_retried_when_back_online() {
    let mirror = TempDir::new().unwrap();
    let present = Part::new("s1", "score", "Score", 0);
    let missing = Part::new("s1", "parts", "Parts", 3 * 1024 * 1024);
    upload(mirror.path(), &present, 1);
    let services = services(mirror.path());
    let states = services.coordinator.states().clone();

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(worker_task(command_rx, update_tx, services));

    command_tx
        .send(ReaderCommand::SetDocuments {
            scores: vec![score("s1", vec![present, missing.clone()])],
        })
        .unwrap();
    collect_until(&mut update_rx, is_pass_finished).await;
    assert_eq!(states.get("s1"), Some(CacheState::Failed));

    command_tx
        .send(ReaderCommand::SetOnline { online: false })
        .unwrap();
    upload(mirror.path(), &missing, 1);
    command_tx
        .send(ReaderCommand::SetOnline { online: true })
        .unwrap();

    collect_until(&mut update_rx, is_pass_finished).await;
    assert_eq!(states.get("s1"), Some(CacheState::Success));

    drop(command_tx);
    worker.await.unwrap();
}

#[tokio::test]
async fn test_no_pass_while_offline() {
    let mirror = TempDir::new().unwrap();
    let part = Part::new("s1", "violin", "Violin", 0);
    upload(mirror.path(), &part, 1);
    let services = services(mirror.path());
    let states = services.coordinator.states().clone();

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(worker_task(command_rx, update_tx, services));

    command_tx
        .send(ReaderCommand::SetOnline { online: false })
        .unwrap();
    command_tx
        .send(ReaderCommand::SetDocuments {
            scores: vec![score("s1", vec![part])],
        })
        .unwrap();
    command_tx.send(ReaderCommand::ViewerClose).unwrap();

    let updates =
        collect_until(&mut update_rx, |u| matches!(u, ReaderUpdate::ViewerClosed)).await;
    assert_eq!(updates.len(), 1);
    assert_eq!(states.get("s1"), None);

    command_tx
        .send(ReaderCommand::SetOnline { online: true })
        .unwrap();
    collect_until(&mut update_rx, is_pass_finished).await;
    assert_eq!(states.get("s1"), Some(CacheState::Success));

    drop(command_tx);
    worker.await.unwrap();
}

#[tokio::test]
async fn test_viewer_coalesces_page_requests() {
    let mirror = TempDir::new().unwrap();
    let part = Part::new("s1", "violin", "Violin", 0);
    upload(mirror.path(), &part, 5);
    let services = services(mirror.path());
    services
        .coordinator
        .run_pass(&[score("s1", vec![part])], &Liveness::new(), |_, _, _| {})
        .await
        .unwrap();

    let identity = DocumentIdentity::new("s1", "violin");
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    command_tx
        .send(ReaderCommand::ViewerOpen {
            identity: identity.clone(),
        })
        .unwrap();
    command_tx
        .send(ReaderCommand::ViewerShowPage { page_index: 1 })
        .unwrap();
    command_tx
        .send(ReaderCommand::ViewerShowPage { page_index: 4 })
        .unwrap();
    command_tx.send(ReaderCommand::ViewerClose).unwrap();
    drop(command_tx);

    worker_task(command_rx, update_tx, services).await;

    let mut updates = Vec::new();
    while let Ok(update) = update_rx.try_recv() {
        updates.push(update);
    }

    match &updates[0] {
        ReaderUpdate::ViewerOpened {
            identity: opened,
            page_count,
            preview,
        } => {
            assert_eq!(opened, &identity);
            assert_eq!(*page_count, 5);
            assert!(preview.is_some());
        }
        other => panic!("unexpected update {:?}", other),
    }
    let rendered: Vec<(usize, u32, u32)> = updates
        .iter()
        .filter_map(|u| match u {
            ReaderUpdate::ViewerPageRendered {
                page_index,
                width,
                height,
                ..
            } => Some((*page_index, *width, *height)),
            _ => None,
        })
        .collect();
    assert_eq!(rendered, vec![(4, 100, 100), (5, 100, 100)]);
    assert!(matches!(updates.last(), Some(ReaderUpdate::ViewerClosed)));
}

#[tokio::test]
async fn test_opening_uncached_document_reports_error() {
    let mirror = TempDir::new().unwrap();
    let services = services(mirror.path());
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();

    command_tx
        .send(ReaderCommand::ViewerOpen {
            identity: DocumentIdentity::new("s1", "missing"),
        })
        .unwrap();
    command_tx
        .send(ReaderCommand::ViewerShowPage { page_index: 1 })
        .unwrap();
    drop(command_tx);
    worker_task(command_rx, update_tx, services).await;

    let first = update_rx.try_recv().unwrap();
    assert!(matches!(first, ReaderUpdate::Error { ref message } if message.contains("not cached")));
    let second = update_rx.try_recv().unwrap();
    assert!(matches!(second, ReaderUpdate::Error { ref message } if message.contains("No document is open")));
}

#[tokio::test]
async fn test_annotation_keys_use_configured_user() {
    let mirror = TempDir::new().unwrap();
    let services = services(mirror.path());

    let key = services.annotation_key("s1", "violin", 2);

    assert_eq!(key.storage_key(), "annotation/u1/s1/violin/2");
}

#[tokio::test]
async fn test_viewer_responds_while_download_stalls() {
    let services = services_with(Arc::new(StalledStorage));
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(worker_task(command_rx, update_tx, services));

    command_tx
        .send(ReaderCommand::SetDocuments {
            scores: vec![score("s1", vec![Part::new("s1", "violin", "Violin", 0)])],
        })
        .unwrap();
    collect_until(&mut update_rx, |u| {
        matches!(u, ReaderUpdate::CacheState { state: CacheState::Working, .. })
    })
    .await;

    command_tx
        .send(ReaderCommand::SetOnline { online: false })
        .unwrap();
    command_tx
        .send(ReaderCommand::ViewerOpen {
            identity: DocumentIdentity::new("s1", "violin"),
        })
        .unwrap();
    let reply = timeout(
        Duration::from_secs(2),
        collect_until(&mut update_rx, |u| matches!(u, ReaderUpdate::Error { .. })),
    )
    .await
    .expect("viewer command was not handled");
    assert!(matches!(
        reply.last(),
        Some(ReaderUpdate::Error { message }) if message.contains("not cached")
    ));

    // Reconnecting queues a new pass behind the stalled one
    command_tx
        .send(ReaderCommand::SetOnline { online: true })
        .unwrap();
    command_tx.send(ReaderCommand::ViewerClose).unwrap();
    timeout(
        Duration::from_secs(2),
        collect_until(&mut update_rx, |u| matches!(u, ReaderUpdate::ViewerClosed)),
    )
    .await
    .expect("viewer close was not handled");

    drop(command_tx);
    timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker did not shut down")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_annotation_redraw_uses_configured_interval() {
    use score_annotate::{Color, RasterSurface, SurfaceBox, Tool};

    let mirror = TempDir::new().unwrap();
    let mut services = services(mirror.path());
    services.config.redraw_interval_ms = 40;
    let controller = services.annotation_controller();
    controller
        .open(services.annotation_key("s1", "violin", 1))
        .await
        .unwrap();
    let surface = SurfaceBox::new(100.0, 100.0);
    assert!(controller.pointer_down(Tool::Pen, Color::Red, [10.0, 10.0], surface));

    let redraw = {
        let services = services.clone();
        let controller = controller.clone();
        tokio::spawn(async move {
            let mut ink = RasterSurface::new(100, 100);
            let frames = services.redraw_annotations(&controller, &mut ink).await;
            (frames, ink)
        })
    };

    // Frames at 0, 40 and 80 ms while the stroke is active
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.pointer_move([90.0, 90.0]);
    controller.pointer_up().await.unwrap();

    let (frames, ink) = redraw.await.unwrap();
    assert!((3..=5).contains(&frames), "drew {} frames", frames);
    assert!(ink.to_image().get_pixel(50, 50)[3] > 0);
}
