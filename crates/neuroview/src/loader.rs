//! Background decoding of dataset files and the scene join
//!
//! `AsyncLoader` owns a fixed pool of worker threads fed over a
//! crossbeam channel. Each queued file gets a `LoadHandle`; decoded files
//! come back as `LoadResult`s in completion order. Files that depend on each
//! other (a curvature map on its surface, connectome edges on their nodes)
//! are decoded independently and joined afterwards by `Scene::assemble`,
//! whatever order they finished in.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use neuroview_formats::{
    ConnectomeEdges, ConnectomeGraph, ConnectomeNodes, Curvature, CurvatureMap, FormatError,
    Surface, TrackSet,
};

use crate::discovery::{DatasetFile, DatasetKind, Hemisphere};

/// Handle for tracking async load operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadHandle(u64);

/// Status of a load operation
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Queued,
    Loading,
    Completed,
    Failed(String),
    Cancelled,
}

/// Errors raised while loading or joining dataset files
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode {path}: {source}")]
    Format { path: PathBuf, source: FormatError },
    #[error("No {hemisphere:?} surface to pair with curvature {path}")]
    MissingSurface {
        path: PathBuf,
        hemisphere: Option<Hemisphere>,
    },
    #[error("Loader has shut down")]
    Disconnected,
}

/// A decoded file, before any join
#[derive(Debug, Clone)]
pub enum DecodedAsset {
    Surface(Surface),
    Curvature(CurvatureMap),
    Tracks(TrackSet),
    ConnectomeNodes(ConnectomeNodes),
    ConnectomeEdges(ConnectomeEdges),
}

/// Result of an async load operation
#[derive(Debug)]
pub struct LoadResult {
    pub handle: LoadHandle,
    pub file: DatasetFile,
    pub bytes: usize,
    pub elapsed: Duration,
    pub result: Result<DecodedAsset, LoadError>,
}

/// Read and decode one file on the calling thread
pub fn decode_file(path: &Path, kind: DatasetKind) -> Result<(DecodedAsset, usize), LoadError> {
    let data = std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let format_error = |e: FormatError| LoadError::Format {
        path: path.to_path_buf(),
        source: e,
    };

    let asset = match kind {
        DatasetKind::Surface => DecodedAsset::Surface(Surface::decode(&data).map_err(format_error)?),
        DatasetKind::Curvature => {
            DecodedAsset::Curvature(CurvatureMap::decode(&data).map_err(format_error)?)
        }
        DatasetKind::Tracks => DecodedAsset::Tracks(TrackSet::decode(&data).map_err(format_error)?),
        DatasetKind::ConnectomeNodes => {
            DecodedAsset::ConnectomeNodes(ConnectomeNodes::from_slice(&data).map_err(format_error)?)
        }
        DatasetKind::ConnectomeEdges => {
            DecodedAsset::ConnectomeEdges(ConnectomeEdges::from_slice(&data).map_err(format_error)?)
        }
    };

    Ok((asset, data.len()))
}

struct LoadRequest {
    handle: LoadHandle,
    file: DatasetFile,
}

/// Internal message for worker threads
enum WorkerMessage {
    Load(LoadRequest),
    Shutdown,
}

struct LoadingState {
    active_loads: HashMap<LoadHandle, LoadStatus>,
    path_to_handle: HashMap<PathBuf, LoadHandle>,
    next_handle: u64,
    /// Queued or loading requests whose result has not been received yet
    pending: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderStats {
    pub queued: usize,
    pub loading: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_active: usize,
}

/// Worker pool decoding dataset files in the background
pub struct AsyncLoader {
    request_sender: Sender<WorkerMessage>,
    result_receiver: Receiver<LoadResult>,
    loading_state: Arc<Mutex<LoadingState>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl AsyncLoader {
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (request_tx, request_rx) = unbounded();
        let (result_tx, result_rx) = bounded(100);

        let loading_state = Arc::new(Mutex::new(LoadingState {
            active_loads: HashMap::new(),
            path_to_handle: HashMap::new(),
            next_handle: 0,
            pending: 0,
        }));

        info!("Starting dataset loader with {} worker threads", num_workers);

        let workers = (0..num_workers)
            .map(|worker_id| {
                let rx = request_rx.clone();
                let tx = result_tx.clone();
                let state = loading_state.clone();
                thread::spawn(move || worker_thread(worker_id, rx, tx, state))
            })
            .collect();

        Self {
            request_sender: request_tx,
            result_receiver: result_rx,
            loading_state,
            workers,
        }
    }

    fn state(&self) -> MutexGuard<'_, LoadingState> {
        lock(&self.loading_state)
    }

    /// Queue a file for decoding. A path already queued returns its
    /// existing handle.
    pub fn queue(&self, file: DatasetFile) -> Result<LoadHandle, LoadError> {
        let handle = {
            let mut state = self.state();
            if let Some(&existing) = state.path_to_handle.get(&file.path) {
                return Ok(existing);
            }

            let handle = LoadHandle(state.next_handle);
            state.next_handle += 1;
            state.active_loads.insert(handle, LoadStatus::Queued);
            state.path_to_handle.insert(file.path.clone(), handle);
            state.pending += 1;
            handle
        };

        if self
            .request_sender
            .send(WorkerMessage::Load(LoadRequest { handle, file }))
            .is_err()
        {
            let mut state = self.state();
            state.pending = state.pending.saturating_sub(1);
            state
                .active_loads
                .insert(handle, LoadStatus::Failed("loader shut down".to_string()));
            return Err(LoadError::Disconnected);
        }

        Ok(handle)
    }

    /// Queue a path with an explicit kind
    pub fn queue_path(&self, path: PathBuf, kind: DatasetKind) -> Result<LoadHandle, LoadError> {
        self.queue(DatasetFile {
            path,
            kind,
            hemisphere: None,
        })
    }

    /// Get the status of a load operation
    pub fn status(&self, handle: LoadHandle) -> Option<LoadStatus> {
        self.state().active_loads.get(&handle).cloned()
    }

    /// Cancel a load that has not started yet
    pub fn cancel(&self, handle: LoadHandle) -> bool {
        let mut state = self.state();
        if state.active_loads.get(&handle) != Some(&LoadStatus::Queued) {
            return false;
        }
        state.active_loads.insert(handle, LoadStatus::Cancelled);
        state.pending = state.pending.saturating_sub(1);
        true
    }

    fn record(&self, result: &LoadResult) {
        let mut state = self.state();
        let status = match &result.result {
            Ok(_) => LoadStatus::Completed,
            Err(e) => LoadStatus::Failed(e.to_string()),
        };
        state.active_loads.insert(result.handle, status);
        state.pending = state.pending.saturating_sub(1);
    }

    /// Collect every result that is ready without blocking
    pub fn poll_completed(&self) -> Vec<LoadResult> {
        let mut completed = Vec::new();
        while let Ok(result) = self.result_receiver.try_recv() {
            self.record(&result);
            completed.push(result);
        }
        completed
    }

    /// Block until every queued file has been decoded
    pub fn wait_all(&self) -> Vec<LoadResult> {
        let mut completed = self.poll_completed();
        while self.state().pending > 0 {
            match self.result_receiver.recv() {
                Ok(result) => {
                    self.record(&result);
                    completed.push(result);
                }
                Err(_) => {
                    error!("All loader workers exited with loads pending");
                    break;
                }
            }
        }
        completed
    }

    /// Get loading statistics
    pub fn stats(&self) -> LoaderStats {
        let state = self.state();
        let mut stats = LoaderStats {
            total_active: state.active_loads.len(),
            ..LoaderStats::default()
        };

        for status in state.active_loads.values() {
            match status {
                LoadStatus::Queued => stats.queued += 1,
                LoadStatus::Loading => stats.loading += 1,
                LoadStatus::Completed => stats.completed += 1,
                LoadStatus::Failed(_) => stats.failed += 1,
                LoadStatus::Cancelled => stats.cancelled += 1,
            }
        }

        stats
    }

    /// Stop the workers once they finish their current file
    pub fn shutdown(&mut self) {
        for _ in &self.workers {
            let _ = self.request_sender.send(WorkerMessage::Shutdown);
        }

        // Results may still be in flight; drain so no worker blocks on send
        while let Some(worker) = self.workers.pop() {
            while !worker.is_finished() {
                while self.result_receiver.try_recv().is_ok() {}
                thread::sleep(Duration::from_millis(1));
            }
            let _ = worker.join();
        }
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(state: &Mutex<LoadingState>) -> MutexGuard<'_, LoadingState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn worker_thread(
    id: usize,
    receiver: Receiver<WorkerMessage>,
    sender: Sender<LoadResult>,
    state: Arc<Mutex<LoadingState>>,
) {
    debug!("Worker thread {} started", id);

    while let Ok(WorkerMessage::Load(request)) = receiver.recv() {
        {
            let mut state = lock(&state);
            if state.active_loads.get(&request.handle) != Some(&LoadStatus::Queued) {
                continue;
            }
            state.active_loads.insert(request.handle, LoadStatus::Loading);
        }

        debug!("Worker {} decoding {:?}", id, request.file.path);
        let started = Instant::now();
        let (result, bytes) = match decode_file(&request.file.path, request.file.kind) {
            Ok((asset, bytes)) => (Ok(asset), bytes),
            Err(e) => (Err(e), 0),
        };

        let load_result = LoadResult {
            handle: request.handle,
            file: request.file,
            bytes,
            elapsed: started.elapsed(),
            result,
        };

        if sender.send(load_result).is_err() {
            error!("Worker {} failed to send result", id);
            break;
        }
    }

    debug!("Worker thread {} exited", id);
}

/// A surface with every curvature map of its hemisphere joined onto it
#[derive(Debug, Clone)]
pub struct SurfaceLayer {
    pub path: PathBuf,
    pub hemisphere: Option<Hemisphere>,
    pub surface: Surface,
    /// Joined maps (curv, sulc, thickness, ...) in path order
    pub curvatures: Vec<(PathBuf, Curvature)>,
}

impl SurfaceLayer {
    /// The joined map whose file name ends with `suffix`, e.g. `"curv"`
    pub fn curvature(&self, suffix: &str) -> Option<&Curvature> {
        self.curvatures
            .iter()
            .find(|(path, _)| path.extension().is_some_and(|ext| ext == suffix))
            .map(|(_, curvature)| curvature)
    }
}

/// Everything decoded from one dataset, joined
#[derive(Debug, Default)]
pub struct Scene {
    pub surfaces: Vec<SurfaceLayer>,
    pub tracks: Vec<(PathBuf, TrackSet)>,
    pub connectome: Option<ConnectomeGraph>,
    pub failures: Vec<(PathBuf, LoadError)>,
}

impl Scene {
    /// Join completed loads. Curvature maps attach to every surface of the
    /// same hemisphere; the first node and edge tables form the connectome.
    pub fn assemble(mut results: Vec<LoadResult>) -> Self {
        results.sort_by(|a, b| a.file.path.cmp(&b.file.path));

        let mut scene = Scene::default();
        let mut curvatures: Vec<(DatasetFile, CurvatureMap)> = Vec::new();
        let mut nodes: Option<(PathBuf, ConnectomeNodes)> = None;
        let mut edges: Option<(PathBuf, ConnectomeEdges)> = None;

        for result in results {
            let file = result.file;
            let asset = match result.result {
                Ok(asset) => asset,
                Err(e) => {
                    warn!("Skipping {:?}: {}", file.path, e);
                    scene.failures.push((file.path, e));
                    continue;
                }
            };

            match asset {
                DecodedAsset::Surface(surface) => scene.surfaces.push(SurfaceLayer {
                    path: file.path,
                    hemisphere: file.hemisphere,
                    surface,
                    curvatures: Vec::new(),
                }),
                DecodedAsset::Curvature(map) => curvatures.push((file, map)),
                DecodedAsset::Tracks(set) => scene.tracks.push((file.path, set)),
                DecodedAsset::ConnectomeNodes(n) => {
                    if nodes.is_none() {
                        nodes = Some((file.path, n));
                    } else {
                        warn!("Ignoring extra connectome node table {:?}", file.path);
                    }
                }
                DecodedAsset::ConnectomeEdges(e) => {
                    if edges.is_none() {
                        edges = Some((file.path, e));
                    } else {
                        warn!("Ignoring extra connectome edge table {:?}", file.path);
                    }
                }
            }
        }

        for (file, map) in curvatures {
            let mut paired = false;
            for layer in scene
                .surfaces
                .iter_mut()
                .filter(|l| l.hemisphere == file.hemisphere)
            {
                paired = true;
                match map.unroll_onto(&layer.surface) {
                    Ok(buffer) => layer.curvatures.push((
                        file.path.clone(),
                        Curvature {
                            map: map.clone(),
                            buffer,
                        },
                    )),
                    Err(e) => scene.failures.push((
                        file.path.clone(),
                        LoadError::Format {
                            path: file.path.clone(),
                            source: e,
                        },
                    )),
                }
            }
            if !paired {
                scene.failures.push((
                    file.path.clone(),
                    LoadError::MissingSurface {
                        path: file.path,
                        hemisphere: file.hemisphere,
                    },
                ));
            }
        }

        match (nodes, edges) {
            (Some((_, nodes)), Some((edges_path, edges))) => {
                match ConnectomeGraph::join(nodes, edges) {
                    Ok(graph) => scene.connectome = Some(graph),
                    Err(e) => scene.failures.push((
                        edges_path.clone(),
                        LoadError::Format {
                            path: edges_path,
                            source: e,
                        },
                    )),
                }
            }
            (Some((path, _)), None) => warn!("Connectome nodes {:?} have no edge table", path),
            (None, Some((path, _))) => warn!("Connectome edges {:?} have no node table", path),
            (None, None) => {}
        }

        scene
    }
}
