#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use vivo::config::RuntimeConfig;
use vivo::interpreter::console::Console;
use vivo::interpreter::hooks::Phase;
use vivo::interpreter::loader::LoadPath;
use vivo::script::{Handle, ScriptContext, ScriptEngine, ScriptFailure, Value, native};
use vivo::{Interpreter, RhaiEngine};

pub type Log = Rc<RefCell<Vec<String>>>;

/// Line-oriented stand-in for a scripting language:
///
/// ```text
/// fail <message>         evaluation itself fails
/// define <entry>         entry point that records "<entry>"
/// raise <entry>          entry point that fails with "<entry> boom"
/// prehook <phase>        records "pre:<phase>"
/// posthook <phase>       records "post:<phase>"
/// posthook! <phase>      records "post!:<phase>" and fails
/// depend <path>          requests a dependency
/// ```
pub struct FakeEngine {
    pub log: Log,
    pub evaluations: Rc<RefCell<Vec<bool>>>,
    pub dependency_loads: Rc<RefCell<Vec<PathBuf>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            log: Log::default(),
            evaluations: Rc::default(),
            dependency_loads: Rc::default(),
        }
    }

    fn recorder(&self, label: String) -> Handle {
        let log = self.log.clone();
        native(label.clone(), move |args| {
            let rendered: Vec<String> = args.iter().map(render).collect();
            if rendered.is_empty() {
                log.borrow_mut().push(label.clone());
            } else {
                log.borrow_mut()
                    .push(format!("{}({})", label, rendered.join(",")));
            }
            Ok(Value::Unit)
        })
    }

    fn raiser(&self, label: String, message: String) -> Handle {
        let log = self.log.clone();
        native(label.clone(), move |_| {
            log.borrow_mut().push(label.clone());
            Err(ScriptFailure::new("RuntimeError", message.clone())
                .with_backtrace(vec![format!("sketch:1 in `{}`", label)]))
        })
    }

    fn entry(&self, name: &str, handle: Handle, ctx: &mut ScriptContext) {
        let entries = &mut ctx.entry_points;
        let slot = match name {
            "setup" => &mut entries.setup,
            "update" => &mut entries.update,
            "draw" => &mut entries.draw,
            "exit" => &mut entries.exit,
            "defaults" => &mut entries.defaults,
            "key_down" => &mut entries.key_down,
            "key_pressed" => &mut entries.key_pressed,
            "key_up" => &mut entries.key_up,
            "mouse_moved" => &mut entries.mouse_moved,
            "mouse_dragged" => &mut entries.mouse_dragged,
            "mouse_down" => &mut entries.mouse_down,
            "mouse_pressed" => &mut entries.mouse_pressed,
            "mouse_up" => &mut entries.mouse_up,
            "window_resized" => &mut entries.window_resized,
            other => panic!("unknown entry point {}", other),
        };
        *slot = Some(handle);
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Unit => "()".into(),
        Value::Bool(value) => value.to_string(),
        Value::Int(value) => value.to_string(),
        Value::Float(value) => value.to_string(),
        Value::Str(value) => value.clone(),
    }
}

impl ScriptEngine for FakeEngine {
    fn evaluate(
        &mut self,
        source: &str,
        _origin: &Path,
        reset: bool,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        // Every evaluation redefines the whole sketch; `reset` is only
        // recorded.
        self.evaluations.borrow_mut().push(reset);
        ctx.reset();

        for line in source.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
            match word {
                "fail" => {
                    return Err(ScriptFailure::new("SyntaxError", rest));
                }
                "define" => {
                    let handle = self.recorder(rest.to_string());
                    self.entry(rest, handle, ctx);
                }
                "raise" => {
                    let handle =
                        self.raiser(rest.to_string(), format!("{} boom", rest));
                    self.entry(rest, handle, ctx);
                }
                "prehook" | "posthook" | "posthook!" => {
                    let phase: Phase = rest.parse().expect("phase");
                    let label = format!("{}:{}", word.replace("hook", ""), rest);
                    let handle = if word == "posthook!" {
                        self.raiser(label, format!("{} hook boom", rest))
                    } else {
                        self.recorder(label)
                    };
                    if word == "prehook" {
                        ctx.hooks.add_prehook(phase, handle);
                    } else {
                        ctx.hooks.add_posthook(phase, handle);
                    }
                }
                "depend" => ctx.request_dependency(rest),
                other => panic!("unknown directive {}", other),
            }
        }
        Ok(())
    }

    fn load_dependency(
        &mut self,
        path: &Path,
        _ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        self.dependency_loads.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

pub fn config(watch_interval: u32) -> RuntimeConfig {
    RuntimeConfig {
        width: 64,
        height: 48,
        watch_interval,
        default_load_path: false,
        ..RuntimeConfig::default()
    }
}

pub fn load_path(dir: &Path) -> LoadPath {
    let mut load_path = LoadPath::new();
    load_path.push(dir);
    load_path
}

/// Writes `source` to `dir/name` with an mtime `age` in the past.
pub fn write_script(dir: &Path, name: &str, source: &str, age: Duration) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, source).expect("write script");
    set_mtime(&path, SystemTime::now() - age);
    path
}

/// Rewrites `path` so the watcher sees it as newer than anything before.
pub fn edit_script(path: &Path, source: impl AsRef<[u8]>, bump: Duration) {
    let previous = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .expect("mtime");
    fs::write(path, source).expect("rewrite script");
    set_mtime(path, previous.max(SystemTime::now()) + bump);
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = fs::File::options()
        .write(true)
        .open(path)
        .expect("open script");
    file.set_modified(time).expect("set mtime");
}

pub fn fake_interpreter(
    dir: &Path,
    script: &Path,
    watch_interval: u32,
) -> (Interpreter<FakeEngine>, Log, Rc<RefCell<Vec<bool>>>) {
    let engine = FakeEngine::new();
    let log = engine.log.clone();
    let evaluations = engine.evaluations.clone();
    let mut interpreter =
        Interpreter::new(engine, Console::new(), &config(watch_interval));
    interpreter.initialize(load_path(dir)).expect("initialize");
    interpreter.load_script(script).expect("load");
    (interpreter, log, evaluations)
}

pub fn rhai_interpreter(
    dir: &Path,
    script: &Path,
    watch_interval: u32,
) -> (Interpreter<RhaiEngine>, Console) {
    let console = Console::new();
    let engine = RhaiEngine::new(console.clone());
    let mut interpreter =
        Interpreter::new(engine, console.clone(), &config(watch_interval));
    interpreter.initialize(load_path(dir)).expect("initialize");
    interpreter.load_script(script).expect("load");
    (interpreter, console)
}

pub fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}
