//! Running a guest module's entry point against the shim.

use crate::console::ConsoleSink;
use crate::error::{GuestExit, ShimError};
use crate::shim::{self, GuestSystem, ImportPolicy};
use wasmtime::{Engine, Module, Store};

/// How a guest run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestStatus {
    /// `_start` returned without calling `proc_exit`
    Returned,
    /// `proc_exit` was called with this code
    Exited(i32),
    /// Guest trapped, failed to instantiate, or had no entry point
    Trapped(String),
    /// The shim could not serve the guest
    Defect(ShimError),
}

impl GuestStatus {
    /// Process exit code, when the guest terminated normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GuestStatus::Returned => Some(0),
            GuestStatus::Exited(code) => Some(*code),
            GuestStatus::Trapped(_) | GuestStatus::Defect(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

/// Final status plus the sink holding everything the guest wrote.
#[derive(Debug)]
pub struct GuestOutcome<S> {
    pub status: GuestStatus,
    pub sink: S,
}

/// Runs command-style guest modules (those exporting `_start`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WasiShim {
    policy: ImportPolicy,
}

impl WasiShim {
    pub fn new(policy: ImportPolicy) -> Self {
        Self { policy }
    }

    /// Instantiate `module`, bind its memory, and run `_start` to completion.
    ///
    /// Blocks the calling thread for as long as the guest runs.
    pub fn start<S: ConsoleSink>(&self, engine: &Engine, module: &Module, sink: S) -> GuestOutcome<S> {
        let linker = match shim::linker::<S>(engine, module, self.policy) {
            Ok(linker) => linker,
            Err(defect) => {
                return GuestOutcome {
                    status: GuestStatus::Defect(defect),
                    sink,
                };
            }
        };

        let mut store = Store::new(engine, GuestSystem::new(sink));
        let status = match linker.instantiate(&mut store, module) {
            Err(e) => classify(e, store.data().exit_code()),
            Ok(instance) => {
                if let Some(memory) = instance.get_memory(&mut store, "memory") {
                    store.data_mut().bind_memory(memory);
                }
                match instance.get_typed_func::<(), ()>(&mut store, "_start") {
                    Err(_) => GuestStatus::Trapped("guest module does not export `_start`".to_string()),
                    Ok(entry) => match entry.call(&mut store, ()) {
                        Ok(()) => GuestStatus::Returned,
                        Err(e) => classify(e, store.data().exit_code()),
                    },
                }
            }
        };

        tracing::debug!("Guest finished: {:?}", status);
        GuestOutcome {
            status,
            sink: store.into_data().into_sink(),
        }
    }
}

/// Sort a wasmtime error into exit, shim defect, or genuine trap.
fn classify(err: wasmtime::Error, recorded_exit: Option<i32>) -> GuestStatus {
    if let Some(GuestExit(code)) = err.downcast_ref::<GuestExit>() {
        return GuestStatus::Exited(recorded_exit.unwrap_or(*code));
    }
    if let Some(defect) = err.downcast_ref::<ShimError>() {
        return GuestStatus::Defect(defect.clone());
    }
    if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
        return GuestStatus::Trapped(trap.to_string());
    }
    GuestStatus::Trapped(err.to_string())
}
