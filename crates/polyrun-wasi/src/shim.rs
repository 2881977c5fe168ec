//! The `wasi_snapshot_preview1` import surface.
//!
//! Only the syscalls a C runtime start-up sequence and console output need
//! are implemented. Every other preview 1 import the module declares is
//! linked to a stub that traps with [`ShimError::Gap`], or, under
//! [`ImportPolicy::Strict`], refused at link time.

use crate::console::{ConsoleSink, Stream};
use crate::errno::{self, Errno};
use crate::error::{GuestExit, ShimError};
use crate::memory::GuestMemory;
use wasmtime::{Caller, ExternType, Linker, Memory, Module};

/// Import module name for WASI preview 1.
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// Syscalls the shim implements.
pub const SUPPORTED_SYSCALLS: &[&str] = &[
    "fd_write",
    "fd_fdstat_get",
    "fd_prestat_get",
    "fd_prestat_dir_name",
    "proc_exit",
    "environ_sizes_get",
    "environ_get",
    "args_sizes_get",
    "args_get",
    "clock_time_get",
    "fd_seek",
    "fd_read",
    "fd_close",
];

/// Size of a preview 1 `fdstat` record.
const FDSTAT_SIZE: usize = 24;

/// What to do with preview 1 imports outside [`SUPPORTED_SYSCALLS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Link a stub that traps with [`ShimError::Gap`] if the guest calls it
    #[default]
    TrapOnCall,
    /// Refuse to link the module at all
    Strict,
}

/// Per-instance host state backing the shim.
pub struct GuestSystem<S> {
    sink: S,
    memory: Option<Memory>,
    exit_code: Option<i32>,
}

impl<S: ConsoleSink> GuestSystem<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            memory: None,
            exit_code: None,
        }
    }

    /// Bind the guest's exported memory. Must happen before the entry point
    /// runs.
    pub fn bind_memory(&mut self, memory: Memory) {
        self.memory = Some(memory);
    }

    /// Exit code recorded by `proc_exit`, if the guest called it.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn record_exit(&mut self, code: i32) {
        debug_assert!(self.exit_code.is_none(), "proc_exit recorded twice");
        self.exit_code.get_or_insert(code);
    }
}

/// Build a linker for `module` with the shim's imports defined.
pub fn linker<S: ConsoleSink>(
    engine: &wasmtime::Engine,
    module: &Module,
    policy: ImportPolicy,
) -> Result<Linker<GuestSystem<S>>, ShimError> {
    let mut linker = Linker::new(engine);
    add_to_linker(&mut linker).map_err(|e| ShimError::Link(e.to_string()))?;
    add_gap_stubs(&mut linker, module, policy)?;
    Ok(linker)
}

/// Define every syscall in [`SUPPORTED_SYSCALLS`] on `linker`.
pub fn add_to_linker<S: ConsoleSink>(linker: &mut Linker<GuestSystem<S>>) -> wasmtime::Result<()> {
    linker.func_wrap(WASI_MODULE, "fd_write", fd_write::<S>)?;
    linker.func_wrap(WASI_MODULE, "fd_fdstat_get", fd_fdstat_get::<S>)?;
    linker.func_wrap(
        WASI_MODULE,
        "fd_prestat_get",
        |_caller: Caller<'_, GuestSystem<S>>, _fd: i32, _buf: i32| -> i32 { errno::BADF },
    )?;
    linker.func_wrap(
        WASI_MODULE,
        "fd_prestat_dir_name",
        |_caller: Caller<'_, GuestSystem<S>>, _fd: i32, _path: i32, _len: i32| -> i32 {
            errno::BADF
        },
    )?;
    linker.func_wrap(WASI_MODULE, "proc_exit", proc_exit::<S>)?;
    linker.func_wrap(
        WASI_MODULE,
        "environ_sizes_get",
        |caller: Caller<'_, GuestSystem<S>>, count: i32, buf_size: i32| {
            zero_sizes(caller, "environ_sizes_get", count, buf_size)
        },
    )?;
    linker.func_wrap(
        WASI_MODULE,
        "environ_get",
        |_caller: Caller<'_, GuestSystem<S>>, _environ: i32, _buf: i32| -> i32 { errno::SUCCESS },
    )?;
    linker.func_wrap(
        WASI_MODULE,
        "args_sizes_get",
        |caller: Caller<'_, GuestSystem<S>>, argc: i32, buf_size: i32| {
            zero_sizes(caller, "args_sizes_get", argc, buf_size)
        },
    )?;
    linker.func_wrap(
        WASI_MODULE,
        "args_get",
        |_caller: Caller<'_, GuestSystem<S>>, _argv: i32, _buf: i32| -> i32 { errno::SUCCESS },
    )?;
    linker.func_wrap(WASI_MODULE, "clock_time_get", clock_time_get::<S>)?;
    linker.func_wrap(
        WASI_MODULE,
        "fd_seek",
        |_caller: Caller<'_, GuestSystem<S>>, _fd: i32, _offset: i64, _whence: i32, _out: i32| -> i32 {
            errno::SPIPE
        },
    )?;
    linker.func_wrap(WASI_MODULE, "fd_read", fd_read::<S>)?;
    linker.func_wrap(
        WASI_MODULE,
        "fd_close",
        |_caller: Caller<'_, GuestSystem<S>>, _fd: i32| -> i32 { errno::SUCCESS },
    )?;
    Ok(())
}

/// Cover the module's unimplemented preview 1 imports.
fn add_gap_stubs<S: ConsoleSink>(
    linker: &mut Linker<GuestSystem<S>>,
    module: &Module,
    policy: ImportPolicy,
) -> Result<(), ShimError> {
    for import in module.imports() {
        if import.module() != WASI_MODULE {
            return Err(ShimError::Link(format!(
                "unsupported import {}::{}",
                import.module(),
                import.name()
            )));
        }
        if SUPPORTED_SYSCALLS.contains(&import.name()) {
            continue;
        }
        let syscall = import.name().to_string();
        if policy == ImportPolicy::Strict {
            return Err(ShimError::Gap { syscall });
        }
        let ExternType::Func(ty) = import.ty() else {
            return Err(ShimError::Link(format!(
                "{}::{} is not a function import",
                WASI_MODULE, syscall
            )));
        };

        tracing::debug!("Stubbing unimplemented syscall {}", syscall);
        let name = syscall.clone();
        linker
            .func_new(WASI_MODULE, &syscall, ty, move |_caller, _params, _results| {
                tracing::error!("Guest called unimplemented syscall {}", name);
                Err(wasmtime::Error::new(ShimError::Gap {
                    syscall: name.clone(),
                }))
            })
            .map_err(|e| ShimError::Link(e.to_string()))?;
    }
    Ok(())
}

/// The bound guest memory, or a trap naming the offending syscall.
fn bound_memory<S: ConsoleSink>(
    caller: &Caller<'_, GuestSystem<S>>,
    syscall: &'static str,
) -> wasmtime::Result<Memory> {
    caller
        .data()
        .memory
        .ok_or_else(|| wasmtime::Error::new(ShimError::MemoryUnbound { syscall }))
}

/// Collapse an errno result into the value handed back to the guest.
fn errno_of(result: Result<(), Errno>) -> i32 {
    match result {
        Ok(()) => errno::SUCCESS,
        Err(code) => code,
    }
}

fn fd_write<S: ConsoleSink>(
    mut caller: Caller<'_, GuestSystem<S>>,
    fd: i32,
    iovs: i32,
    iovs_len: i32,
    nwritten: i32,
) -> wasmtime::Result<i32> {
    let memory = bound_memory(&caller, "fd_write")?;
    let Some(stream) = Stream::from_fd(fd) else {
        return Ok(errno::BADF);
    };

    let (bytes, state) = memory.data_and_store_mut(&mut caller);
    let mut mem = GuestMemory::new(bytes);
    let result = write_iovecs(&mut mem, &mut state.sink, stream, iovs as u32, iovs_len as u32)
        .and_then(|written| mem.write_u32(nwritten as u32, written));

    Ok(errno_of(result))
}

/// Forward each (ptr, len) iovec to the sink; returns the total byte count.
fn write_iovecs<S: ConsoleSink>(
    mem: &mut GuestMemory<'_>,
    sink: &mut S,
    stream: Stream,
    iovs: u32,
    iovs_len: u32,
) -> Result<u32, Errno> {
    let mut written: u32 = 0;
    for i in 0..iovs_len {
        let entry = iovs.wrapping_add(i.wrapping_mul(8));
        let ptr = mem.read_u32(entry)?;
        let len = mem.read_u32(entry.wrapping_add(4))?;
        let chunk = mem.slice(ptr, len)?;
        sink.write(stream, chunk);
        written = written.wrapping_add(len);
    }
    Ok(written)
}

fn fd_fdstat_get<S: ConsoleSink>(
    mut caller: Caller<'_, GuestSystem<S>>,
    _fd: i32,
    buf: i32,
) -> wasmtime::Result<i32> {
    let memory = bound_memory(&caller, "fd_fdstat_get")?;
    let mut mem = GuestMemory::new(memory.data_mut(&mut caller));

    // filetype u8 @0, flags u16 @2, rights_base u64 @8, rights_inheriting u64 @16
    Ok(errno_of(mem.write_bytes(buf as u32, &[0u8; FDSTAT_SIZE])))
}

fn proc_exit<S: ConsoleSink>(mut caller: Caller<'_, GuestSystem<S>>, code: i32) -> wasmtime::Result<()> {
    tracing::debug!("Guest called proc_exit({})", code);
    caller.data_mut().record_exit(code);
    Err(wasmtime::Error::new(GuestExit(code)))
}

/// `environ_sizes_get` / `args_sizes_get`: nothing to report.
fn zero_sizes<S: ConsoleSink>(
    mut caller: Caller<'_, GuestSystem<S>>,
    syscall: &'static str,
    count: i32,
    buf_size: i32,
) -> wasmtime::Result<i32> {
    let memory = bound_memory(&caller, syscall)?;
    let mut mem = GuestMemory::new(memory.data_mut(&mut caller));
    let result = mem
        .write_u32(count as u32, 0)
        .and_then(|_| mem.write_u32(buf_size as u32, 0));
    Ok(errno_of(result))
}

fn clock_time_get<S: ConsoleSink>(
    mut caller: Caller<'_, GuestSystem<S>>,
    _clock_id: i32,
    _precision: i64,
    time: i32,
) -> wasmtime::Result<i32> {
    let memory = bound_memory(&caller, "clock_time_get")?;
    let mut mem = GuestMemory::new(memory.data_mut(&mut caller));
    Ok(errno_of(mem.write_u64(time as u32, 0)))
}

fn fd_read<S: ConsoleSink>(
    mut caller: Caller<'_, GuestSystem<S>>,
    _fd: i32,
    _iovs: i32,
    _iovs_len: i32,
    nread: i32,
) -> wasmtime::Result<i32> {
    let memory = bound_memory(&caller, "fd_read")?;
    let mut mem = GuestMemory::new(memory.data_mut(&mut caller));
    Ok(errno_of(mem.write_u32(nread as u32, 0)))
}
