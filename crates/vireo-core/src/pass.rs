//! The pass driver and its parallel per-function scheduling.
//!
//! Module mutation is partitioned by function: a worker holds the only
//! mutable reference to its function, while module-level structures (the
//! type table, the globals list) stay read-only for the duration of a pass.

use std::thread;

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::ir::{Function, Module};

/// Driver configuration, loadable from a host's config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PassOptions {
    /// When positive, prefer smaller output over more optimization
    /// opportunities.
    #[serde(default)]
    pub shrink_level: u32,
    /// Whether other modules may observe or extend this module's types and
    /// globals. Whole-module passes refuse to run on open-world modules.
    #[serde(default)]
    pub open_world: bool,
}

/// A whole-module transformation.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Whether the pass's rewrites are only sound when no other module can
    /// observe this one.
    fn requires_closed_world(&self) -> bool {
        false
    }

    fn run(&mut self, runner: &PassRunner, module: &mut Module) -> Result<()>;
}

/// Runs passes over a module with shared options.
#[derive(Debug, Default)]
pub struct PassRunner {
    pub options: PassOptions,
}

impl PassRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PassOptions) -> Self {
        Self { options }
    }

    pub fn run(&self, pass: &mut dyn Pass, module: &mut Module) -> Result<()> {
        if pass.requires_closed_world() && self.options.open_world {
            anyhow::bail!(
                "pass {} requires a closed-world module",
                pass.name()
            );
        }
        debug!(pass = pass.name(), "running");
        pass.run(self, module)
    }
}

/// Apply `f` to every function, one worker per function across OS threads,
/// returning the per-function results in function order.
///
/// `f` sees imported (body-less) functions too and is expected to handle
/// them; each invocation has exclusive access to its function.
pub fn map_functions_parallel<T, F>(functions: &mut [Function], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&mut Function) -> T + Sync,
{
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(functions.len().max(1));
    if workers <= 1 {
        return functions.iter_mut().map(f).collect();
    }

    let chunk_size = functions.len().div_ceil(workers);
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = functions
            .chunks_mut(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter_mut().map(f).collect::<Vec<_>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("function worker panicked"))
            .collect()
    })
}
