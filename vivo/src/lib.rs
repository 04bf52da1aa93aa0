pub mod config;
pub mod interpreter;
#[path = "core/prelude.rs"]
pub mod prelude;
pub mod runtime;
pub mod script;

pub mod core {
    pub mod fatal;
    pub mod logging;
}

pub mod render {
    pub mod canvas;
    pub mod gpu;
    pub mod graphics;
}

pub use crate::config::RuntimeConfig;
pub use crate::core::fatal::FatalError;
pub use crate::core::logging::init_logger;
pub use crate::core::logging::{debug, error, info, trace, warn};
pub use crate::interpreter::{Interpreter, State};
pub use crate::runtime::app::run;
pub use crate::script::rhai_engine::RhaiEngine;
