//! WASI preview 1 errno values returned by the shim.

/// Errno as seen by the guest.
pub type Errno = i32;

pub const SUCCESS: Errno = 0;
/// Bad file descriptor. Also ends the guest's preopen enumeration loop.
pub const BADF: Errno = 8;
/// Bad address: an iovec or out-pointer fell outside guest memory.
pub const FAULT: Errno = 21;
/// Invalid seek: console streams are pipes.
pub const SPIPE: Errno = 70;
