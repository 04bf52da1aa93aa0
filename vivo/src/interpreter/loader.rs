use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories_next::BaseDirs;

use crate::core::fatal::FatalError;
use crate::core::logging::{debug, info, warn};
use crate::interpreter::console::STDOUT;
use crate::interpreter::watcher::modified_time;
use crate::interpreter::{Interpreter, State};
use crate::render::graphics::{Graphics, Region};
use crate::script::{ScriptEngine, ScriptFailure};

pub const PATH_ENV_VAR: &str = "VIVO_PATH";

/// Ordered directories searched when a script includes another file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadPath {
    entries: Vec<PathBuf>,
}

impl LoadPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the search path from, in order, the colon separated `env`
    /// value, the explicit directories, then the library default.
    pub fn from_sources(
        env: Option<&str>,
        explicit: &[PathBuf],
        default: Option<PathBuf>,
    ) -> Self {
        let mut load_path = Self::new();

        if let Some(value) = env {
            for entry in value.split(':').filter(|entry| !entry.is_empty()) {
                load_path.push(entry);
            }
        }

        for entry in explicit {
            load_path.append_resolved(entry);
        }

        if let Some(default) = default {
            load_path.push(default);
        }

        load_path
    }

    /// [`Self::from_sources`] with the `VIVO_PATH` environment variable.
    pub fn from_env(explicit: &[PathBuf], default: Option<PathBuf>) -> Self {
        let value = env::var(PATH_ENV_VAR).ok();
        Self::from_sources(value.as_deref(), explicit, default)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `path` as given. Returns false for duplicates.
    pub fn push(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.entries.contains(&path) {
            return false;
        }
        self.entries.push(path);
        true
    }

    /// Appends the canonical form of `path`, skipping it with a warning when
    /// it does not resolve.
    pub fn append_resolved(&mut self, path: &Path) -> bool {
        match fs::canonicalize(path) {
            Ok(resolved) => self.push(resolved),
            Err(err) => {
                warn!(
                    "ignoring load path entry '{}': {}",
                    path.display(),
                    err
                );
                false
            }
        }
    }

    /// Moves or inserts `path` at the front.
    pub fn unshift(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.entries.retain(|entry| entry != &path);
        self.entries.insert(0, path);
    }

    /// Finds `relative` in the first entry that contains it. Absolute paths
    /// resolve to themselves when they exist.
    pub fn resolve(&self, relative: &Path) -> Option<PathBuf> {
        if relative.is_absolute() {
            return relative.exists().then(|| relative.to_path_buf());
        }
        self.entries
            .iter()
            .map(|entry| entry.join(relative))
            .find(|candidate| candidate.is_file())
    }
}

/// Script text must be UTF-8. Undecodable bytes are a script failure, not
/// an inaccessible file.
fn decode_source(path: &Path, bytes: Vec<u8>) -> Result<String, ScriptFailure> {
    String::from_utf8(bytes).map_err(|err| {
        ScriptFailure::new(
            "EncodingError",
            format!(
                "{} is not valid UTF-8 (invalid byte at offset {})",
                path.display(),
                err.utf8_error().valid_up_to()
            ),
        )
        .with_backtrace(vec![path.display().to_string()])
    })
}

/// Where shared script libraries live unless the load path is overridden.
pub fn default_library_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.data_dir().join("vivo").join("lib"))
}

impl<E: ScriptEngine> Interpreter<E> {
    /// Installs the search path. The runtime cannot resolve anything without
    /// one, so an empty path is fatal.
    pub fn initialize(&mut self, load_path: LoadPath) -> Result<(), FatalError> {
        if load_path.is_empty() {
            return Err(FatalError::NoLoadPath);
        }
        debug!("load path: {:?}", load_path.entries());
        self.ctx.load_path = load_path;
        Ok(())
    }

    /// Resolves the primary script, makes its directory the data path and
    /// starts watching it. Nothing is evaluated until [`Self::run`].
    pub fn load_script(&mut self, path: impl AsRef<Path>) -> Result<(), FatalError> {
        let path = path.as_ref();
        let inaccessible = |source| FatalError::ScriptInaccessible {
            path: path.to_path_buf(),
            source,
        };

        let modified = modified_time(path).map_err(inaccessible)?;
        let resolved = fs::canonicalize(path).map_err(inaccessible)?;
        let data_path = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!("loading {}", resolved.display());
        self.ctx.data_path = Some(data_path.clone());
        self.ctx.load_path.unshift(data_path);
        self.watcher.register_primary(resolved.clone());
        self.watcher.seed(modified);
        self.script_path = Some(resolved);
        Ok(())
    }

    /// Re-evaluates the primary script.
    pub fn reload(
        &mut self,
        forced: bool,
        gfx: &mut dyn Graphics,
    ) -> Result<(), FatalError> {
        let Some(path) = self.script_path.clone() else {
            debug!("reload() without a loaded script");
            return Ok(());
        };
        self.reload_from(&path, forced, gfx)
    }

    /// Evaluates `path` into the session. Reloading out of `Error` is
    /// always forced, so a broken script never leaves half its definitions
    /// behind.
    pub fn reload_from(
        &mut self,
        path: &Path,
        forced: bool,
        gfx: &mut dyn Graphics,
    ) -> Result<(), FatalError> {
        if self.state == State::NoSketch {
            debug!("reload of {} before run()", path.display());
            return Ok(());
        }

        let forced = forced || self.state == State::Error;
        if self.state == State::Running {
            let frame = gfx.capture(Region::full(gfx.width(), gfx.height()));
            self.last_good_frame = Some(frame);
        }

        let bytes = fs::read(path).map_err(|source| {
            FatalError::ScriptInaccessible {
                path: path.to_path_buf(),
                source,
            }
        })?;

        self.console.log(
            STDOUT,
            format_args!("Reading {} ({}b)\n", path.display(), bytes.len()),
        );
        debug!(
            "evaluating {} ({} bytes, forced: {})",
            path.display(),
            bytes.len(),
            forced
        );

        let result = match decode_source(path, bytes) {
            Ok(source) => {
                self.sync_engine(gfx);
                let result =
                    self.engine.evaluate(&source, path, forced, &mut self.ctx);
                self.console.set_verbose(self.ctx.verbose);
                for dependency in self.ctx.take_dependencies() {
                    if self.watcher.register(dependency.clone()) {
                        debug!("watching {}", dependency.display());
                    }
                }
                result
            }
            Err(failure) => Err(failure),
        };

        match result {
            Ok(()) => {
                if self.state == State::Error {
                    info!("recovered from error");
                }
                self.recover();
                if forced && self.setup_done {
                    self.setup(gfx);
                }
            }
            Err(failure) => {
                let backdrop = match self.state {
                    State::Running => self.last_good_frame.clone(),
                    _ => None,
                };
                self.enter_error(failure, backdrop);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecodable_source_is_a_script_failure() {
        let path = Path::new("sketch.rhai");
        assert_eq!(decode_source(path, b"fn draw() {}".to_vec()), Ok("fn draw() {}".into()));

        let failure = decode_source(path, b"// \xff\xfe".to_vec()).expect_err("invalid");
        assert_eq!(failure.class_name, "EncodingError");
        assert!(failure.message.contains("offset 3"));
    }

    #[test]
    fn sources_are_ordered_env_explicit_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let explicit = dir.path().canonicalize().expect("canonicalize");

        let load_path = LoadPath::from_sources(
            Some("/env/a::/env/b"),
            &[explicit.clone(), PathBuf::from("/definitely/missing/dir")],
            Some(PathBuf::from("/usr/share/vivo")),
        );

        assert_eq!(
            load_path.entries(),
            &[
                PathBuf::from("/env/a"),
                PathBuf::from("/env/b"),
                explicit,
                PathBuf::from("/usr/share/vivo"),
            ]
        );
    }

    #[test]
    fn empty_sources_produce_empty_path() {
        let load_path = LoadPath::from_sources(Some(""), &[], None);
        assert!(load_path.is_empty());
    }

    #[test]
    fn unshift_moves_existing_entry_to_front() {
        let mut load_path = LoadPath::new();
        load_path.push("/a");
        load_path.push("/b");
        assert!(!load_path.push("/a"));

        load_path.unshift("/b");
        assert_eq!(
            load_path.entries(),
            &[PathBuf::from("/b"), PathBuf::from("/a")]
        );
    }

    #[test]
    fn resolve_searches_entries_in_order() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        fs::write(second.path().join("lib.rhai"), "").expect("write");

        let mut load_path = LoadPath::new();
        load_path.push(first.path());
        load_path.push(second.path());

        assert_eq!(
            load_path.resolve(Path::new("lib.rhai")),
            Some(second.path().join("lib.rhai"))
        );
        assert_eq!(load_path.resolve(Path::new("nope.rhai")), None);

        fs::write(first.path().join("lib.rhai"), "").expect("write");
        assert_eq!(
            load_path.resolve(Path::new("lib.rhai")),
            Some(first.path().join("lib.rhai"))
        );
    }
}
