use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::fatal::FatalError;

pub const DEFAULT_WATCH_INTERVAL: u32 = 30;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchChange {
    /// Position in the watch list. Zero is the primary script.
    pub index: usize,
    pub path: PathBuf,
}

/// Polls the modification times of the primary script and its
/// dependencies every `interval` frames.
///
/// A single "last seen" timestamp is shared by every file: a change is any
/// file whose mtime is newer than the newest mtime observed so far.
#[derive(Debug)]
pub struct ScriptWatcher {
    files: Vec<PathBuf>,
    last_seen: SystemTime,
    interval: u32,
    frames_until_check: u32,
}

impl ScriptWatcher {
    pub fn new(interval: u32) -> Self {
        let interval = interval.max(1);
        Self {
            files: Vec::new(),
            last_seen: UNIX_EPOCH,
            interval,
            frames_until_check: interval,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn primary(&self) -> Option<&Path> {
        self.files.first().map(PathBuf::as_path)
    }

    pub fn last_seen(&self) -> SystemTime {
        self.last_seen
    }

    pub fn frames_until_check(&self) -> u32 {
        self.frames_until_check
    }

    /// Appends a dependency. Returns false when the path is already watched.
    pub fn register(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.files.contains(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    /// Makes `path` entry 0, moving it there if it was already watched.
    pub fn register_primary(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.files.retain(|watched| watched != &path);
        self.files.insert(0, path);
    }

    /// Raises the shared timestamp to `time` if it is newer.
    pub fn seed(&mut self, time: SystemTime) {
        if time > self.last_seen {
            self.last_seen = time;
        }
    }

    /// Counts down one frame. Returns true on exactly every `interval`-th
    /// call, at which point the countdown starts over.
    pub fn tick(&mut self) -> bool {
        self.frames_until_check = self.frames_until_check.saturating_sub(1);
        if self.frames_until_check == 0 {
            self.frames_until_check = self.interval;
            true
        } else {
            false
        }
    }

    /// Stats every watched file in list order and reports each one newer
    /// than the shared timestamp, raising the timestamp as it goes. Any file
    /// that cannot be stat'ed is fatal.
    pub fn poll(&mut self) -> Result<Vec<WatchChange>, FatalError> {
        let mut changes = Vec::new();

        for (index, path) in self.files.iter().enumerate() {
            let modified = modified_time(path).map_err(|source| {
                FatalError::WatchedFileInaccessible {
                    path: path.clone(),
                    source,
                }
            })?;

            if modified > self.last_seen {
                self.last_seen = modified;
                changes.push(WatchChange {
                    index,
                    path: path.clone(),
                });
            }
        }

        Ok(changes)
    }
}

impl Default for ScriptWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WATCH_INTERVAL)
    }
}

pub fn modified_time(path: &Path) -> std::io::Result<SystemTime> {
    let metadata = fs::metadata(path)?;
    Ok(metadata.modified().unwrap_or(UNIX_EPOCH))
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    fn touch(path: &Path, time: SystemTime) {
        let file = File::options()
            .write(true)
            .open(path)
            .expect("open watched file");
        file.set_modified(time).expect("set mtime");
    }

    fn script(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).expect("create script");
        writeln!(file, "fn draw() {{}}").expect("write script");
        path
    }

    #[test]
    fn tick_fires_every_interval() {
        let mut watcher = ScriptWatcher::new(3);
        let fired: Vec<bool> = (0..7).map(|_| watcher.tick()).collect();
        assert_eq!(
            fired,
            vec![false, false, true, false, false, true, false]
        );
    }

    #[test]
    fn zero_interval_checks_every_frame() {
        let mut watcher = ScriptWatcher::new(0);
        assert_eq!(watcher.interval(), 1);
        assert!(watcher.tick());
        assert!(watcher.tick());
    }

    #[test]
    fn register_is_idempotent() {
        let mut watcher = ScriptWatcher::default();
        assert!(watcher.register("a.rhai"));
        assert!(!watcher.register("a.rhai"));
        assert!(watcher.register("b.rhai"));
        assert_eq!(watcher.files().len(), 2);

        watcher.register_primary("b.rhai");
        assert_eq!(watcher.primary(), Some(Path::new("b.rhai")));
        assert_eq!(watcher.files().len(), 2);
    }

    #[test]
    fn poll_reports_files_newer_than_shared_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let main = script(dir.path(), "main.rhai");
        let lib = script(dir.path(), "lib.rhai");

        let base = SystemTime::now() - Duration::from_secs(60);
        touch(&main, base);
        touch(&lib, base);

        let mut watcher = ScriptWatcher::new(1);
        watcher.register_primary(&main);
        watcher.register(&lib);
        watcher.seed(base);

        assert!(watcher.poll().expect("poll").is_empty());

        touch(&lib, base + Duration::from_secs(5));
        let changes = watcher.poll().expect("poll");
        assert_eq!(
            changes,
            vec![WatchChange {
                index: 1,
                path: lib.clone()
            }]
        );
        assert_eq!(watcher.last_seen(), base + Duration::from_secs(5));

        // Nothing changed since; the timestamp already covers both files.
        assert!(watcher.poll().expect("poll").is_empty());
    }

    #[test]
    fn older_dependency_edit_is_masked_by_newer_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let main = script(dir.path(), "main.rhai");
        let lib = script(dir.path(), "lib.rhai");

        let base = SystemTime::now() - Duration::from_secs(60);
        touch(&main, base + Duration::from_secs(10));
        touch(&lib, base);

        let mut watcher = ScriptWatcher::new(1);
        watcher.register_primary(&main);
        watcher.register(&lib);

        let changes = watcher.poll().expect("poll");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].index, 0);

        touch(&lib, base + Duration::from_secs(5));
        assert!(watcher.poll().expect("poll").is_empty());
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let main = script(dir.path(), "main.rhai");

        let mut watcher = ScriptWatcher::new(1);
        watcher.register_primary(&main);
        std::fs::remove_file(&main).expect("remove");

        match watcher.poll() {
            Err(FatalError::WatchedFileInaccessible { path, .. }) => {
                assert_eq!(path, main);
            }
            other => panic!("expected fatal error, got {:?}", other),
        }
    }
}
