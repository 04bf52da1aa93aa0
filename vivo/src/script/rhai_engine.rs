use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::AHashSet;
use rhai::{
    AST, CallFnOptions, Dynamic, Engine, EvalAltResult, Map, ParseError,
    Position, Scope,
};

use crate::core::logging::{debug, warn};
use crate::interpreter::console::Console;
use crate::render::graphics::Graphics;
use crate::script::api::{self, ApiState, HookKind, HookRequest, SharedApi};
use crate::script::{
    Callable, FrameEnv, Handle, ScriptContext, ScriptEngine, ScriptFailure,
    Value, native,
};

/// Script functions recognised as entry points, with their arity.
const ENTRY_POINTS: &[(&str, usize)] = &[
    ("setup", 0),
    ("update", 0),
    ("draw", 0),
    ("exit", 0),
    ("defaults", 0),
    ("key_down", 1),
    ("key_pressed", 1),
    ("key_up", 1),
    ("mouse_moved", 2),
    ("mouse_dragged", 3),
    ("mouse_down", 3),
    ("mouse_pressed", 3),
    ("mouse_up", 3),
    ("window_resized", 2),
];

const ERROR_FORMATTER: &str = "process_error";

/// Everything a script function needs to run, shared with the handles the
/// interpreter holds.
struct Runtime {
    engine: Engine,
    ast: RefCell<AST>,
    scope: RefCell<Scope<'static>>,
    /// The object bound to `this` in every entry point and hook.
    sketch: RefCell<Dynamic>,
}

impl Runtime {
    fn has_fn(&self, name: &str, arity: usize) -> bool {
        self.ast
            .borrow()
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }
}

struct ScriptFn {
    runtime: Rc<Runtime>,
    name: String,
}

impl Callable for ScriptFn {
    fn invoke(&self, args: &[Value]) -> Result<Value, ScriptFailure> {
        let args: Vec<Dynamic> = args.iter().map(to_dynamic).collect();
        let ast = self.runtime.ast.borrow();
        let mut scope = self.runtime.scope.borrow_mut();
        let mut sketch = self.runtime.sketch.borrow_mut();

        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut sketch);

        self.runtime
            .engine
            .call_fn_with_options::<Dynamic>(
                options,
                &mut scope,
                &ast,
                &self.name,
                args,
            )
            .map(from_dynamic)
            .map_err(|err| failure_from_eval(&err))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// [`ScriptEngine`] backed by rhai.
///
/// Reloads merge: functions from new source replace those of the same name
/// and arity, and the sketch object bound to `this` survives. A reset
/// starts from an empty session.
pub struct RhaiEngine {
    runtime: Rc<Runtime>,
    api: SharedApi,
    registered_hooks: AHashSet<HookRequest>,
    included: AHashSet<PathBuf>,
}

impl RhaiEngine {
    pub fn new(console: Console) -> Self {
        let api = SharedApi::default();
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        api::register_api(&mut engine, &api, &console);

        Self {
            runtime: Rc::new(Runtime {
                engine,
                ast: RefCell::new(AST::empty()),
                scope: RefCell::new(Scope::new()),
                sketch: RefCell::new(Dynamic::from_map(Map::new())),
            }),
            api,
            registered_hooks: AHashSet::new(),
            included: AHashSet::new(),
        }
    }

    /// The sketch object scripts see as `this`.
    pub fn sketch_state(&self) -> Dynamic {
        self.runtime.sketch.borrow().clone()
    }

    pub fn api(&self) -> &SharedApi {
        &self.api
    }

    fn reset(&mut self, ctx: &mut ScriptContext) {
        *self.runtime.ast.borrow_mut() = AST::empty();
        *self.runtime.scope.borrow_mut() = Scope::new();
        *self.runtime.sketch.borrow_mut() = Dynamic::from_map(Map::new());
        {
            let mut api = self.api.borrow_mut();
            let env = api.env;
            *api = ApiState {
                env,
                ..ApiState::default()
            };
        }
        self.registered_hooks.clear();
        self.included.clear();
        ctx.reset();
    }

    fn callable(&self, name: &str) -> Handle {
        Rc::new(ScriptFn {
            runtime: self.runtime.clone(),
            name: name.to_string(),
        })
    }

    fn apply_source(
        &mut self,
        source: &str,
        origin: &Path,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        let mut ast = self
            .runtime
            .engine
            .compile(source)
            .map_err(|err| parse_failure(&err, origin))?;
        ast.set_source(origin.display().to_string());

        let runnable = {
            let mut merged = self.runtime.ast.borrow_mut();
            *merged = merged.merge(&ast.clone_functions_only());
            merged.merge(&ast)
        };

        if let Some(data_path) = &ctx.data_path {
            self.api.borrow_mut().data_path = data_path.display().to_string();
        }

        self.api.borrow_mut().loading = true;
        let result = {
            let mut scope = self.runtime.scope.borrow_mut();
            self.runtime.engine.run_ast_with_scope(&mut scope, &runnable)
        };
        self.api.borrow_mut().loading = false;
        result.map_err(|err| failure_from_eval(&err))?;

        self.settle(ctx)?;
        self.discover_entry_points(ctx);
        Ok(())
    }

    fn load_file(
        &mut self,
        path: &Path,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        let source = fs::read_to_string(path).map_err(|err| {
            ScriptFailure::new(
                "LoadError",
                format!("cannot read {}: {}", path.display(), err),
            )
        })?;
        debug!("evaluating {} ({} bytes)", path.display(), source.len());
        self.apply_source(&source, path, ctx)
    }

    /// Applies registrations the script made since the last call.
    fn settle(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptFailure> {
        let requests = std::mem::take(&mut self.api.borrow_mut().requests);

        if let Some(verbose) = requests.verbose {
            ctx.verbose = verbose;
        }
        for include in requests.includes {
            self.include(&include, ctx)?;
        }
        for request in requests.hooks {
            self.register_hook(request, ctx)?;
        }
        Ok(())
    }

    fn register_hook(
        &mut self,
        request: HookRequest,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        if !self.runtime.has_fn(&request.name, 0) {
            return Err(ScriptFailure::new(
                "HookError",
                format!(
                    "cannot hook {} onto {}: no function {}()",
                    request.name, request.phase, request.name
                ),
            ));
        }
        if self.registered_hooks.contains(&request) {
            return Ok(());
        }

        let handle = self.callable(&request.name);
        match request.kind {
            HookKind::Pre => ctx.hooks.add_prehook(request.phase, handle),
            HookKind::Post => ctx.hooks.add_posthook(request.phase, handle),
        }
        debug!("registered {:?} hook {} for {}", request.kind, request.name, request.phase);
        self.registered_hooks.insert(request);
        Ok(())
    }

    fn include(
        &mut self,
        name: &str,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        let Some(found) = ctx.load_path.resolve(Path::new(name)) else {
            return Err(ScriptFailure::new(
                "LoadError",
                format!("cannot include {}: not found in load path", name),
            ));
        };
        let path = fs::canonicalize(&found).unwrap_or(found);

        ctx.request_dependency(path.clone());
        if !self.included.insert(path.clone()) {
            return Ok(());
        }
        self.load_file(&path, ctx)
    }

    fn discover_entry_points(&self, ctx: &mut ScriptContext) {
        let lookup = |name: &str, arity: usize| {
            self.runtime
                .has_fn(name, arity)
                .then(|| self.callable(name))
        };

        let mut found = ENTRY_POINTS
            .iter()
            .map(|(name, arity)| lookup(name, *arity));
        let mut next = || found.next().flatten();

        let entries = &mut ctx.entry_points;
        entries.setup = next();
        entries.update = next();
        entries.draw = next();
        entries.exit = next();
        let script_defaults = next();
        entries.key_down = next();
        entries.key_pressed = next();
        entries.key_up = next();
        entries.mouse_moved = next();
        entries.mouse_dragged = next();
        entries.mouse_down = next();
        entries.mouse_pressed = next();
        entries.mouse_up = next();
        entries.window_resized = next();

        let api = self.api.clone();
        entries.defaults = Some(native("defaults", move |args| {
            api.borrow_mut().style = api::Style::default();
            match &script_defaults {
                Some(defaults) => defaults.invoke(args),
                None => Ok(Value::Unit),
            }
        }));
    }
}

impl ScriptEngine for RhaiEngine {
    fn evaluate(
        &mut self,
        source: &str,
        origin: &Path,
        reset: bool,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        if reset {
            debug!("resetting script session");
            self.reset(ctx);
        }
        self.included.insert(origin.to_path_buf());
        self.apply_source(source, origin, ctx)
    }

    fn load_dependency(
        &mut self,
        path: &Path,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure> {
        self.included.insert(path.to_path_buf());
        self.load_file(path, ctx)
    }

    fn process_error(
        &mut self,
        failure: &ScriptFailure,
    ) -> Result<String, ScriptFailure> {
        if !self.runtime.has_fn(ERROR_FORMATTER, 1) {
            return Ok(failure.to_string());
        }
        let formatter = self.callable(ERROR_FORMATTER);
        match formatter.invoke(&[Value::from(failure.message.as_str())])? {
            Value::Str(message) => Ok(message),
            Value::Unit => Ok(failure.to_string()),
            other => Ok(value_text(&other)),
        }
    }

    fn sync(&mut self, env: &FrameEnv, ctx: &mut ScriptContext) {
        self.api.borrow_mut().env = *env;
        if let Err(failure) = self.settle(ctx) {
            warn!("ignoring registration: {}", failure);
        }
    }

    fn flush(&mut self, gfx: &mut dyn Graphics) {
        let commands = std::mem::take(&mut self.api.borrow_mut().commands);
        for command in &commands {
            command.apply(gfx);
        }
    }
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Unit => Dynamic::UNIT,
        Value::Bool(value) => Dynamic::from(*value),
        Value::Int(value) => Dynamic::from(*value),
        Value::Float(value) => Dynamic::from(*value),
        Value::Str(value) => Dynamic::from(value.clone()),
    }
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Unit;
    }
    if let Ok(value) = value.as_bool() {
        return Value::Bool(value);
    }
    if let Ok(value) = value.as_int() {
        return Value::Int(value);
    }
    if let Ok(value) = value.as_float() {
        return Value::Float(value);
    }
    Value::Str(value.to_string())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Unit => String::new(),
        Value::Bool(value) => value.to_string(),
        Value::Int(value) => value.to_string(),
        Value::Float(value) => value.to_string(),
        Value::Str(value) => value.clone(),
    }
}

fn class_name(err: &EvalAltResult) -> &'static str {
    match err {
        EvalAltResult::ErrorParsing(..) => "ParseError",
        EvalAltResult::ErrorVariableNotFound(..) => "NameError",
        EvalAltResult::ErrorFunctionNotFound(..) => "NoMethodError",
        EvalAltResult::ErrorPropertyNotFound(..) => "NoMethodError",
        EvalAltResult::ErrorMismatchDataType(..) => "TypeError",
        EvalAltResult::ErrorMismatchOutputType(..) => "TypeError",
        EvalAltResult::ErrorArithmetic(..) => "ArithmeticError",
        EvalAltResult::ErrorArrayBounds(..) => "IndexError",
        EvalAltResult::ErrorStringBounds(..) => "IndexError",
        EvalAltResult::ErrorStackOverflow(..) => "StackOverflow",
        EvalAltResult::ErrorRuntime(..) => "RuntimeError",
        _ => "ScriptError",
    }
}

fn frame(source: &str, position: Position, function: Option<&str>) -> String {
    let location = match (position.line(), position.position()) {
        (Some(line), Some(column)) => format!("{}:{}:{}", source, line, column),
        (Some(line), None) => format!("{}:{}", source, line),
        _ => source.to_string(),
    };
    match function {
        Some(name) => format!("{} in `{}`", location, name),
        None => location,
    }
}

/// Unwraps nested function call errors into a backtrace, innermost first.
fn failure_from_eval(err: &EvalAltResult) -> ScriptFailure {
    let mut calls = Vec::new();
    let mut current = err;
    while let EvalAltResult::ErrorInFunctionCall(name, source, inner, position) =
        current
    {
        calls.push((name.as_str(), source.as_str(), *position));
        current = &**inner;
    }

    let source = calls.last().map(|(_, source, _)| *source).unwrap_or("script");
    let mut backtrace = Vec::new();
    if !current.position().is_none() {
        backtrace.push(frame(source, current.position(), None));
    }
    for (name, source, position) in calls.iter().rev() {
        backtrace.push(frame(source, *position, Some(name)));
    }

    ScriptFailure::new(class_name(current), current.to_string())
        .with_backtrace(backtrace)
}

fn parse_failure(err: &ParseError, origin: &Path) -> ScriptFailure {
    let source = origin.display().to_string();
    ScriptFailure::new("ParseError", format!("{} in {}", err, source))
        .with_backtrace(vec![frame(&source, err.position(), None)])
}
