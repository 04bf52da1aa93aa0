pub use crate::config::RuntimeConfig;
pub use crate::core::fatal::FatalError;
pub use crate::core::logging::init_logger;
pub use crate::core::logging::{debug, error, info, trace, warn};
pub use crate::interpreter::console::{Console, STDERR, STDOUT};
pub use crate::interpreter::hooks::Phase;
pub use crate::interpreter::input::MouseButton;
pub use crate::interpreter::loader::LoadPath;
pub use crate::interpreter::{Interpreter, State};
pub use crate::render::canvas::Canvas;
pub use crate::render::graphics::{Graphics, Image, Region, Rgba};
pub use crate::script::rhai_engine::RhaiEngine;
pub use crate::script::{ScriptEngine, ScriptFailure, Value};
