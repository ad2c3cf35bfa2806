//! Background database paging
//!
//! Subgraphs load on dedicated worker threads while the frame loop keeps
//! running against a placeholder node. Workers only ever produce
//! [`NodePrototype`](crate::io::NodePrototype) data; the structure enters the
//! scene exclusively through [`DatabasePager::merge_with`], which the frame
//! loop calls between frames. No cull or draw pass can hold a reference into
//! a subtree while it is being attached.
//!
//! A failed load is logged and reported; the placeholder simply stays in
//! place with its empty bound.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;

use crate::config::PagerConfig;
use crate::graph::{NodeId, NodeKind, Scene};
use crate::io::{instantiate, NodePrototype, ReadError, ReaderRegistry};

/// Errors from pager requests
#[derive(Debug, Error)]
pub enum PagerError {
    /// The worker pool has shut down
    #[error("pager workers are no longer running")]
    Disconnected,

    /// The placeholder already has a load in flight
    #[error("placeholder {0:?} already has a pending load")]
    AlreadyPending(NodeId),

    /// The node is not a paging placeholder
    #[error("node {0:?} is not a paged placeholder")]
    NotAPlaceholder(NodeId),
}

struct Request {
    path: String,
    placeholder: NodeId,
}

struct Completed {
    path: String,
    placeholder: NodeId,
    result: Result<NodePrototype, ReadError>,
}

/// Background loader with a frame-boundary commit point
pub struct DatabasePager {
    work_tx: Option<Sender<Request>>,
    done_rx: Receiver<Completed>,
    workers: Vec<JoinHandle<()>>,
    pending: HashSet<NodeId>,
    max_merges_per_frame: usize,
}

impl DatabasePager {
    /// Spawn the worker pool
    pub fn new(registry: Arc<ReaderRegistry>, config: &PagerConfig) -> Self {
        let (work_tx, work_rx) = mpsc::channel::<Request>();
        let (done_tx, done_rx) = mpsc::channel::<Completed>();
        let work_rx = Arc::new(Mutex::new(work_rx));

        let worker_count = config.worker_threads.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let work_rx = Arc::clone(&work_rx);
            let done_tx = done_tx.clone();
            let registry = Arc::clone(&registry);
            let handle = std::thread::Builder::new()
                .name(format!("pager-{index}"))
                .spawn(move || loop {
                    let request = {
                        let Ok(guard) = work_rx.lock() else {
                            break;
                        };
                        guard.recv()
                    };
                    let Ok(request) = request else {
                        break;
                    };
                    let result = registry.read_node(std::path::Path::new(&request.path));
                    let completed = Completed {
                        path: request.path,
                        placeholder: request.placeholder,
                        result,
                    };
                    if done_tx.send(completed).is_err() {
                        break;
                    }
                });
            match handle {
                Ok(handle) => workers.push(handle),
                Err(err) => log::error!("failed to spawn pager worker: {err}"),
            }
        }

        Self {
            work_tx: Some(work_tx),
            done_rx,
            workers,
            pending: HashSet::new(),
            max_merges_per_frame: config.max_merges_per_frame.max(1),
        }
    }

    /// Number of loads requested but not yet merged
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Queue a background load for a placeholder node
    pub fn request_load(
        &mut self,
        placeholder: NodeId,
        path: impl Into<String>,
    ) -> Result<(), PagerError> {
        if self.pending.contains(&placeholder) {
            return Err(PagerError::AlreadyPending(placeholder));
        }
        let tx = self.work_tx.as_ref().ok_or(PagerError::Disconnected)?;
        let path = path.into();
        tx.send(Request {
            path,
            placeholder,
        })
        .map_err(|_| PagerError::Disconnected)?;
        self.pending.insert(placeholder);
        Ok(())
    }

    /// Queue a load using the path recorded in a `Paged` placeholder
    pub fn request_from_node(
        &mut self,
        scene: &Scene,
        placeholder: NodeId,
    ) -> Result<(), PagerError> {
        let Some(node) = scene.node(placeholder) else {
            return Err(PagerError::NotAPlaceholder(placeholder));
        };
        let NodeKind::Paged { file_name, .. } = node.kind() else {
            return Err(PagerError::NotAPlaceholder(placeholder));
        };
        let path = file_name.clone();
        self.request_load(placeholder, path)
    }

    /// Attach completed loads under their placeholders
    ///
    /// This is the only place loaded structure enters the scene; the frame
    /// loop calls it between frames. Returns the number of subgraphs merged.
    /// At most a configured number of merges run per call so a burst of
    /// completions cannot stall one frame.
    pub fn merge_with(&mut self, scene: &mut Scene) -> usize {
        let mut merged = 0;
        while merged < self.max_merges_per_frame {
            let Ok(completed) = self.done_rx.try_recv() else {
                break;
            };
            self.pending.remove(&completed.placeholder);
            match completed.result {
                Ok(prototype) => {
                    if scene.node(completed.placeholder).is_none() {
                        log::debug!(
                            "placeholder removed before \"{}\" finished loading; discarding",
                            completed.path
                        );
                        continue;
                    }
                    let loaded = instantiate(scene, &prototype);
                    match scene.add_child(completed.placeholder, loaded) {
                        Ok(()) => {
                            merged += 1;
                            log::debug!("merged \"{}\"", completed.path);
                        }
                        Err(err) => {
                            log::error!("failed to merge \"{}\": {err}", completed.path);
                            let _ = scene.remove_node(loaded);
                        }
                    }
                }
                Err(err) => {
                    // the placeholder stays; nothing was partially attached
                    log::error!("background load of \"{}\" failed: {err}", completed.path);
                }
            }
        }
        merged
    }
}

impl Drop for DatabasePager {
    fn drop(&mut self) {
        // closing the channel wakes every worker out of recv
        self.work_tx.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("pager worker panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, Instant};

    fn unique_temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "sg_engine_pager_{}_{}",
            std::process::id(),
            name
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    fn wait_for_merge(
        pager: &mut DatabasePager,
        scene: &mut Scene,
        deadline: Duration,
    ) -> usize {
        let start = Instant::now();
        loop {
            let merged = pager.merge_with(scene);
            if merged > 0 || start.elapsed() > deadline {
                return merged;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_load_and_merge_under_placeholder() {
        let path = unique_temp_file("cloud.pts", b"0 0 0\n1 1 1\n2 2 2\n");
        let registry = Arc::new(ReaderRegistry::with_builtin_readers());
        let mut pager = DatabasePager::new(registry, &PagerConfig::default());

        let mut scene = Scene::new();
        let placeholder = scene.create_paged(path.to_string_lossy().into_owned());
        assert!(!scene.bound(placeholder).valid());

        pager.request_from_node(&scene, placeholder).unwrap();
        assert_eq!(pager.pending_count(), 1);

        let merged = wait_for_merge(&mut pager, &mut scene, Duration::from_secs(5));
        assert_eq!(merged, 1);
        assert_eq!(pager.pending_count(), 0);
        assert_eq!(scene.node(placeholder).unwrap().children().len(), 1);
        // the placeholder's bound now covers the loaded points
        assert!(scene.bound(placeholder).valid());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_failed_load_leaves_placeholder_empty() {
        let registry = Arc::new(ReaderRegistry::with_builtin_readers());
        let mut pager = DatabasePager::new(registry, &PagerConfig::default());

        let mut scene = Scene::new();
        let placeholder = scene.create_paged("/definitely/not/there.pts");
        pager.request_from_node(&scene, placeholder).unwrap();

        // the failure drains the pending entry without touching the graph
        let mut merged_total = 0;
        let start = Instant::now();
        while pager.pending_count() > 0 && start.elapsed() < Duration::from_secs(5) {
            merged_total += pager.merge_with(&mut scene);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(merged_total, 0);
        assert_eq!(pager.pending_count(), 0);
        assert!(scene.node(placeholder).unwrap().children().is_empty());
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let registry = Arc::new(ReaderRegistry::with_builtin_readers());
        let mut pager = DatabasePager::new(registry, &PagerConfig::default());
        let mut scene = Scene::new();
        let placeholder = scene.create_paged("somewhere.pts");

        pager.request_from_node(&scene, placeholder).unwrap();
        assert!(matches!(
            pager.request_from_node(&scene, placeholder),
            Err(PagerError::AlreadyPending(_))
        ));
    }
}
