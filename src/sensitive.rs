//! Sensitive memory handling
//!
//! Secret material (the master passphrase, derived keys, decrypted item
//! plaintext) lives in [`SecretBuf`] allocations drawn from a process-wide
//! pool of fixed capacity. Every occupied pool slot records the raw pointer
//! and length of its buffer so that [`zeroize_all`] can wipe all live
//! secrets from a fatal-signal handler, which may touch only this fixed
//! array and async-signal-safe primitives.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};

/// Capacity of the sensitive-buffer pool.
pub const POOL_SLOTS: usize = 100;

struct Slot {
    ptr: AtomicPtr<u8>,
    len: AtomicUsize,
}

#[allow(clippy::declare_interior_mutable_const)]
const FREE_SLOT: Slot = Slot {
    ptr: AtomicPtr::new(ptr::null_mut()),
    len: AtomicUsize::new(0),
};

static POOL: [Slot; POOL_SLOTS] = [FREE_SLOT; POOL_SLOTS];

/// Heap buffer tracked by the sensitive pool.
///
/// The bytes are wiped when the buffer is dropped, and also by
/// [`zeroize_all`] if the process dies on a caught fatal signal first.
pub struct SecretBuf {
    buf: ManuallyDrop<Box<[u8]>>,
    slot: usize,
}

impl SecretBuf {
    /// Allocates a zero-filled buffer of `len` bytes and registers it in
    /// the first free pool slot.
    pub fn zeroed(len: usize) -> Result<Self> {
        let mut buf = ManuallyDrop::new(vec![0u8; len].into_boxed_slice());
        let raw = buf.as_mut_ptr();

        for (slot, entry) in POOL.iter().enumerate() {
            if entry
                .ptr
                .compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                entry.len.store(len, Ordering::SeqCst);
                return Ok(Self { buf, slot });
            }
        }

        ManuallyDrop::into_inner(buf);
        Err(PwmError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::PoolExhausted,
            "no more sensitive memory buffers",
        ))
    }

    /// Allocates a tracked buffer holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut buf = Self::zeroed(data.len())?;
        buf.copy_from_slice(data);
        Ok(buf)
    }
}

impl Deref for SecretBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for SecretBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for SecretBuf {
    fn drop(&mut self) {
        // Wipe while still registered, unregister, then free. The slot
        // must be clear before the allocation is returned so the signal
        // handler never walks into freed memory.
        self.buf.zeroize();
        POOL[self.slot].len.store(0, Ordering::SeqCst);
        POOL[self.slot].ptr.store(ptr::null_mut(), Ordering::SeqCst);
        unsafe {
            ManuallyDrop::drop(&mut self.buf);
        }
    }
}

impl std::fmt::Debug for SecretBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBuf(length={})", self.buf.len())
    }
}

/// Writes zeros through every occupied pool slot without freeing.
///
/// Async-signal-safe: touches only the fixed slot array, with volatile
/// writes that the optimizer cannot elide.
pub fn zeroize_all() {
    for slot in POOL.iter() {
        let raw = slot.ptr.load(Ordering::SeqCst);
        if raw.is_null() {
            continue;
        }
        let len = slot.len.load(Ordering::SeqCst);
        for i in 0..len {
            unsafe {
                ptr::write_volatile(raw.add(i), 0);
            }
        }
    }
    std::sync::atomic::compiler_fence(Ordering::SeqCst);
}

/// Compares two byte buffers in time independent of the first differing
/// index. Used wherever secret material is compared.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

const FATAL_SIGNALS: [libc::c_int; 10] = [
    libc::SIGABRT,
    libc::SIGBUS,
    libc::SIGFPE,
    libc::SIGHUP,
    libc::SIGILL,
    libc::SIGINT,
    libc::SIGPIPE,
    libc::SIGQUIT,
    libc::SIGSEGV,
    libc::SIGTERM,
];

extern "C" fn fatal_signal_handler(_sig: libc::c_int) {
    zeroize_all();
    unsafe {
        libc::_exit(1);
    }
}

/// Registers [`fatal_signal_handler`] for every catchable fatal signal.
pub fn install_signal_handlers() -> Result<()> {
    for sig in FATAL_SIGNALS {
        let rc = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = fatal_signal_handler as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = 0;
            libc::sigaction(sig, &action, ptr::null_mut())
        };
        if rc != 0 {
            return Err(PwmError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("could not install handler for signal {sig}"),
                std::io::Error::last_os_error(),
            ));
        }
    }
    Ok(())
}

/// Requests that the whole virtual address space be locked against paging
/// so secrets are never written to swap.
///
/// Locking can fail when the per-process locked-memory rlimit is below the
/// Argon2 working-set size; that is a known limitation and degrades to a
/// warning rather than refusing to run.
pub fn lock_process_memory() {
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        eprintln!("warning: could not lock memory, secrets may be swapped to disk: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_round_trip() {
        let mut buf = SecretBuf::zeroed(16).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        buf[0] = 0xAA;
        buf[15] = 0x55;
        assert_eq!(buf[0], 0xAA);
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn from_bytes_copies_contents() {
        let buf = SecretBuf::from_bytes(b"secret material").unwrap();
        assert_eq!(&buf[..], b"secret material");
    }

    #[test]
    fn slot_is_reusable_after_drop() {
        for _ in 0..(POOL_SLOTS * 2) {
            let buf = SecretBuf::zeroed(8).unwrap();
            drop(buf);
        }
    }

    // zeroize_all is exercised from tests/zeroize.rs in its own process:
    // it wipes every live pool buffer, which would race with unrelated
    // tests running in this binary.

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq(b"same bytes", b"same bytes"));
        assert!(!constant_time_eq(b"same bytes", b"different!"));
        assert!(!constant_time_eq(b"short", b"longer bytes"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn debug_output_redacts_contents() {
        let buf = SecretBuf::from_bytes(b"hunter2!").unwrap();
        let debug = format!("{buf:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("SecretBuf"));
    }
}
