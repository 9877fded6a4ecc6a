use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use concord_core::types::{ChangeEvent, ChangeKind, TrackerSource};
use crossbeam_channel::Receiver;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Bounds how many undelivered change events the watcher will hold before
/// dropping the oldest (§4.4: "Backpressure: if pending > 1000, drops
/// oldest").
const MAX_PENDING: usize = 1000;

/// Events must settle for this long with no further writes before the
/// watcher considers a project's `issues.jsonl` stable enough to report
/// (§4.4 "Debounces bursts (500ms stability window)").
const STABILITY_WINDOW: Duration = Duration::from_millis(500);

/// Filesystem watcher on each repository's `issues.jsonl` (§4.4, §6),
/// grounded on the teacher's `notify` + `crossbeam_channel` wiring in
/// `at_core::file_watcher`, generalized to watch many repositories and
/// dedupe bursts per project rather than per raw path.
pub struct BeadsWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<notify::Event>>,
    projects_by_path: HashMap<PathBuf, String>,
    last_raw_event: HashMap<String, Instant>,
    pending: VecDeque<ChangeEvent>,
}

impl BeadsWatcher {
    pub fn new() -> Result<Self, notify::Error> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        Ok(Self {
            watcher,
            rx,
            projects_by_path: HashMap::new(),
            last_raw_event: HashMap::new(),
            pending: VecDeque::new(),
        })
    }

    /// Start watching `repo_path`'s `issues.jsonl`, associating changes with
    /// `project_identifier`.
    pub fn watch_project(&mut self, repo_path: &Path, project_identifier: &str) -> Result<(), notify::Error> {
        let jsonl = repo_path.join("issues.jsonl");
        self.watcher.watch(repo_path, RecursiveMode::NonRecursive)?;
        self.projects_by_path.insert(jsonl, project_identifier.to_string());
        Ok(())
    }

    pub fn unwatch_project(&mut self, repo_path: &Path) -> Result<(), notify::Error> {
        self.watcher.unwatch(repo_path)?;
        self.projects_by_path.remove(&repo_path.join("issues.jsonl"));
        Ok(())
    }

    /// Drain raw filesystem events, debounce them per project, and return
    /// the stable ones. Call on a timer (e.g. every `STABILITY_WINDOW`); a
    /// project whose `issues.jsonl` is still being written (last raw event
    /// younger than the stability window) is held back until the next call.
    pub fn poll_events(&mut self) -> Vec<ChangeEvent> {
        let now = Instant::now();

        while let Ok(result) = self.rx.try_recv() {
            let Ok(event) = result else { continue };
            for path in &event.paths {
                if let Some(project_identifier) = self.projects_by_path.get(path) {
                    self.last_raw_event.insert(project_identifier.clone(), now);
                    self.enqueue(ChangeEvent::new(
                        TrackerSource::Beads,
                        project_identifier,
                        ChangeKind::Update,
                        serde_json::json!({ "path": path.to_string_lossy() }),
                    ));
                }
            }
        }

        let mut stable = Vec::new();
        let mut seen_projects = std::collections::HashSet::new();
        // Walk from the back so the most recent event per project survives
        // the debounce dedupe, then restore chronological order.
        let mut remaining = VecDeque::new();
        while let Some(event) = self.pending.pop_back() {
            let is_stable = self
                .last_raw_event
                .get(&event.entity_ref)
                .map(|t| now.duration_since(*t) >= STABILITY_WINDOW)
                .unwrap_or(true);
            if is_stable && seen_projects.insert(event.entity_ref.clone()) {
                stable.push(event);
            } else if !is_stable {
                remaining.push_front(event);
            }
            // else: stable but a newer event for the same project already
            // won — drop this older duplicate.
        }
        self.pending = remaining;
        stable.reverse();
        stable
    }

    fn enqueue(&mut self, event: ChangeEvent) {
        if self.pending.len() >= MAX_PENDING {
            let dropped = self.pending.pop_front();
            warn!(?dropped, "beads watcher pending queue full, dropping oldest event");
        }
        self.pending.push_back(event);
    }
}

impl Default for BeadsWatcher {
    fn default() -> Self {
        Self::new().expect("recommended_watcher should construct")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;

    #[test]
    fn watch_and_unwatch_project() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = BeadsWatcher::new().unwrap();
        watcher.watch_project(dir.path(), "PROJ").unwrap();
        assert!(watcher.projects_by_path.values().any(|p| p == "PROJ"));
        watcher.unwatch_project(dir.path()).unwrap();
        assert!(watcher.projects_by_path.is_empty());
    }

    #[test]
    fn detects_issues_jsonl_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = BeadsWatcher::new().unwrap();
        watcher.watch_project(dir.path(), "PROJ").unwrap();

        fs::write(dir.path().join("issues.jsonl"), "{}\n").unwrap();
        thread::sleep(Duration::from_millis(200));

        // Not yet stable (written < 500ms ago).
        let early = watcher.poll_events();
        assert!(early.is_empty(), "expected no events before the stability window elapses");

        thread::sleep(Duration::from_millis(400));
        let events = watcher.poll_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_ref, "PROJ");
        assert_eq!(events[0].source, TrackerSource::Beads);
    }

    #[test]
    fn pending_queue_drops_oldest_past_capacity() {
        let mut watcher = BeadsWatcher::new().unwrap();
        for i in 0..(MAX_PENDING + 10) {
            watcher.enqueue(ChangeEvent::new(
                TrackerSource::Beads,
                format!("PROJ-{i}"),
                ChangeKind::Update,
                serde_json::Value::Null,
            ));
        }
        assert_eq!(watcher.pending.len(), MAX_PENDING);
        assert_eq!(watcher.pending.front().unwrap().entity_ref, "PROJ-10");
    }

    #[test]
    fn bursts_for_same_project_collapse_to_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = BeadsWatcher::new().unwrap();
        watcher.watch_project(dir.path(), "PROJ").unwrap();

        for _ in 0..5 {
            fs::write(dir.path().join("issues.jsonl"), "{}\n").unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(Duration::from_millis(600));

        let events = watcher.poll_events();
        assert_eq!(events.len(), 1);
    }
}
