use std::fmt;
use std::str::FromStr;

use crate::core::logging::trace;
use crate::script::{Handle, ScriptFailure, Value};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    Setup,
    Update,
    Draw,
    Exit,
}

impl Phase {
    pub const ALL: [Phase; 4] =
        [Phase::Setup, Phase::Update, Phase::Draw, Phase::Exit];

    pub fn name(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Update => "update",
            Self::Draw => "draw",
            Self::Exit => "exit",
        }
    }

    /// Whether posthooks still run after an earlier failure in the phase.
    /// Draw and exit posthooks usually restore state, so every one of them
    /// gets a chance.
    pub fn posthooks_survive_failure(self) -> bool {
        matches!(self, Self::Draw | Self::Exit)
    }

    fn index(self) -> usize {
        match self {
            Self::Setup => 0,
            Self::Update => 1,
            Self::Draw => 2,
            Self::Exit => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.name() == s)
            .ok_or_else(|| format!("unknown phase `{}`", s))
    }
}

/// Ordered callables wrapped around each phase's entry point.
#[derive(Clone, Default)]
pub struct HookPipeline {
    prehooks: [Vec<Handle>; 4],
    posthooks: [Vec<Handle>; 4],
}

/// Every failure raised while running one phase, in the order they
/// happened.
#[derive(Debug, Default)]
pub struct PhaseOutcome {
    pub failures: Vec<ScriptFailure>,
}

impl PhaseOutcome {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

impl HookPipeline {
    pub fn add_prehook(&mut self, phase: Phase, hook: Handle) {
        self.prehooks[phase.index()].push(hook);
    }

    pub fn add_posthook(&mut self, phase: Phase, hook: Handle) {
        self.posthooks[phase.index()].push(hook);
    }

    pub fn prehooks(&self, phase: Phase) -> &[Handle] {
        &self.prehooks[phase.index()]
    }

    pub fn posthooks(&self, phase: Phase) -> &[Handle] {
        &self.posthooks[phase.index()]
    }

    pub fn len(&self) -> usize {
        self.prehooks.iter().chain(&self.posthooks).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.prehooks.iter_mut().for_each(Vec::clear);
        self.posthooks.iter_mut().for_each(Vec::clear);
    }

    /// Runs prehooks, then `prepare`, then `entry` with `args`, then
    /// posthooks.
    ///
    /// A failing prehook stops the remaining prehooks and the entry point.
    /// Posthooks are skipped after a failure unless the phase lets them
    /// survive it, in which case each one runs and reports on its own.
    pub fn invoke_phase(
        &self,
        phase: Phase,
        entry: Option<&Handle>,
        args: &[Value],
        prepare: impl FnOnce(),
    ) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();

        match self.run_prehooks(phase) {
            Ok(()) => {
                prepare();
                if let Some(entry) = entry {
                    trace!("{} -> {}", phase, entry.name());
                    if let Err(failure) = entry.invoke(args) {
                        outcome.failures.push(failure);
                    }
                }
            }
            Err(failure) => outcome.failures.push(failure),
        }

        if !outcome.is_ok() && !phase.posthooks_survive_failure() {
            return outcome;
        }

        for hook in self.posthooks(phase) {
            if let Err(failure) = hook.invoke(&[]) {
                outcome.failures.push(failure);
                if !phase.posthooks_survive_failure() {
                    break;
                }
            }
        }

        outcome
    }

    /// Runs only the posthooks of `phase`, as exit does when the script is
    /// not running.
    pub fn invoke_posthooks(&self, phase: Phase) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        for hook in self.posthooks(phase) {
            if let Err(failure) = hook.invoke(&[]) {
                outcome.failures.push(failure);
            }
        }
        outcome
    }

    fn run_prehooks(&self, phase: Phase) -> Result<(), ScriptFailure> {
        for hook in self.prehooks(phase) {
            hook.invoke(&[])?;
        }
        Ok(())
    }
}
