use crate::services::ReaderServices;
use crate::{ReaderCommand, ReaderUpdate};
use score_cache::{CacheError, CacheState, DocumentIdentity, Liveness, Score, page_window};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

struct RunningPass {
    liveness: Liveness,
    handle: JoinHandle<()>,
}

struct WorkerState {
    services: ReaderServices,
    scores: Vec<Score>,
    online: bool,
    pass: Option<RunningPass>,
    /// Commands pulled off the channel while coalescing, run next
    deferred: VecDeque<ReaderCommand>,
}

/// Async worker task that processes reader commands and sends updates.
///
/// A caching pass runs in its own task, so viewer commands are handled while
/// it downloads. Runs until the command channel closes, then aborts any
/// caching pass and closes the viewer.
pub async fn worker_task(
    mut command_rx: mpsc::UnboundedReceiver<ReaderCommand>,
    update_tx: mpsc::UnboundedSender<ReaderUpdate>,
    services: ReaderServices,
) {
    let forwarder = tokio::spawn(forward_cache_states(
        services.coordinator.states().subscribe(),
        update_tx.clone(),
    ));

    let mut state = WorkerState {
        services,
        scores: Vec::new(),
        online: true,
        pass: None,
        deferred: VecDeque::new(),
    };

    loop {
        let cmd = match state.deferred.pop_front() {
            Some(cmd) => cmd,
            None => match command_rx.recv().await {
                Some(cmd) => cmd,
                None => break,
            },
        };
        process_command(cmd, &mut state, &mut command_rx, &update_tx).await;
    }

    state.shutdown();
    forwarder.abort();
}

async fn process_command(
    cmd: ReaderCommand,
    state: &mut WorkerState,
    command_rx: &mut mpsc::UnboundedReceiver<ReaderCommand>,
    update_tx: &mpsc::UnboundedSender<ReaderUpdate>,
) {
    match cmd {
        ReaderCommand::SetDocuments { mut scores } => {
            // Only the most recent set matters
            while let Ok(next_cmd) = command_rx.try_recv() {
                match next_cmd {
                    ReaderCommand::SetDocuments { scores: newer } => {
                        log::debug!("Discarding queued document set, using newer one");
                        scores = newer;
                    }
                    other => {
                        state.deferred.push_back(other);
                        break;
                    }
                }
            }

            if scores == state.scores {
                log::debug!("Document set unchanged");
                return;
            }
            log::info!("Document set changed ({} scores)", scores.len());
            state.scores = scores;
            state.restart_pass(update_tx);
        }
        ReaderCommand::SetOnline { online } => {
            let was_online = std::mem::replace(&mut state.online, online);
            match (was_online, online) {
                (false, true) => {
                    log::info!("Connectivity regained");
                    state.restart_pass(update_tx);
                }
                (true, false) => {
                    log::info!("Offline, pausing caching");
                    state.stop_pass();
                }
                _ => {}
            }
        }
        ReaderCommand::ViewerOpen { identity } => {
            handle_open(identity, &state.services, update_tx).await;
        }
        ReaderCommand::ViewerShowPage { mut page_index } => {
            // Deduplicate page requests - keep the most recent one
            while let Ok(next_cmd) = command_rx.try_recv() {
                match next_cmd {
                    ReaderCommand::ViewerShowPage {
                        page_index: newer_index,
                    } => {
                        log::debug!("Discarding queued page request, using newer one");
                        page_index = newer_index;
                    }
                    other => {
                        state.deferred.push_back(other);
                        break;
                    }
                }
            }
            handle_show_page(page_index, &state.services, update_tx).await;
        }
        ReaderCommand::ViewerClose => {
            state.services.session.close();
            let _ = update_tx.send(ReaderUpdate::ViewerClosed);
        }
    }
}

impl WorkerState {
    /// Ask the running pass to stop after its current score. Does not wait.
    fn stop_pass(&mut self) {
        if let Some(pass) = &self.pass {
            pass.liveness.cancel();
        }
    }

    fn restart_pass(&mut self, update_tx: &mpsc::UnboundedSender<ReaderUpdate>) {
        self.stop_pass();
        if !self.online || self.scores.is_empty() {
            return;
        }

        let previous = self.pass.take().map(|pass| pass.handle);
        let liveness = Liveness::new();
        let token = liveness.clone();
        let coordinator = self.services.coordinator.clone();
        let scores = self.scores.clone();
        let tx = update_tx.clone();

        let handle = tokio::spawn(async move {
            // Cache states have one writer at a time
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    log::warn!("Caching pass ended abnormally: {}", e);
                }
            }

            let progress_tx = tx.clone();
            let result = coordinator
                .run_pass(&scores, &token, |current, total, score| {
                    let _ = progress_tx.send(ReaderUpdate::Progress {
                        current,
                        total,
                        score_key: score.key.clone(),
                        title: score.title.clone(),
                    });
                })
                .await;

            let update = match result {
                Ok(report) => ReaderUpdate::PassFinished { report },
                Err(e) => ReaderUpdate::Error {
                    message: format!("Caching pass failed: {}", e),
                },
            };
            let _ = tx.send(update);
        });

        self.pass = Some(RunningPass { liveness, handle });
    }

    /// Cancel and abort the pass; a download in progress is dropped
    fn shutdown(&mut self) {
        if let Some(pass) = self.pass.take() {
            pass.liveness.cancel();
            pass.handle.abort();
        }
        self.services.session.close();
    }
}

async fn handle_open(
    identity: DocumentIdentity,
    services: &ReaderServices,
    update_tx: &mpsc::UnboundedSender<ReaderUpdate>,
) {
    match services.session.open(identity.clone()).await {
        Ok(snapshot) => {
            let _ = update_tx.send(ReaderUpdate::ViewerOpened {
                identity,
                page_count: snapshot.page_count,
                preview: snapshot.pages.get(&0).cloned(),
            });
        }
        Err(CacheError::Superseded) => {
            log::debug!("Open of {} superseded", identity.url());
        }
        Err(e) => {
            let _ = update_tx.send(ReaderUpdate::Error {
                message: format!("Failed to open {}: {}", identity.url(), e),
            });
        }
    }
}

async fn handle_show_page(
    page_index: usize,
    services: &ReaderServices,
    update_tx: &mpsc::UnboundedSender<ReaderUpdate>,
) {
    let session = &services.session;
    match session.show_page(page_index).await {
        Ok(_) => {}
        Err(CacheError::Superseded) => return,
        Err(e) => {
            let _ = update_tx.send(ReaderUpdate::Error {
                message: format!("Failed to render page {}: {}", page_index, e),
            });
        }
    }

    // Report whatever part of the window is available, even after a failure
    let snapshot = session.snapshot();
    for page in page_window(page_index, snapshot.page_count) {
        let (Some(url), Some(blob)) = (snapshot.pages.get(&page), session.page_blob(page)) else {
            continue;
        };
        let _ = update_tx.send(ReaderUpdate::ViewerPageRendered {
            page_index: page,
            url: url.clone(),
            width: blob.width,
            height: blob.height,
        });
    }
}

/// Publish every change of the coordinator's state map as individual updates
async fn forward_cache_states(
    mut states_rx: watch::Receiver<HashMap<String, CacheState>>,
    update_tx: mpsc::UnboundedSender<ReaderUpdate>,
) {
    let mut seen: HashMap<String, CacheState> = HashMap::new();
    while states_rx.changed().await.is_ok() {
        let current = states_rx.borrow_and_update().clone();
        for (score_key, state) in &current {
            if seen.get(score_key) == Some(state) {
                continue;
            }
            let update = ReaderUpdate::CacheState {
                score_key: score_key.clone(),
                state: *state,
            };
            if update_tx.send(update).is_err() {
                return;
            }
        }
        seen = current;
    }
}
