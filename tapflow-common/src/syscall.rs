//! Records emitted by the syscall-entry tracepoints. The stream is
//! independent of the flow pipeline; only the channel shape is shared.

/// Kernel task name width.
pub const TASK_COMM_LEN: usize = 16;
/// Capacity of [`SyscallEvent::path`].
pub const SYSCALL_PATH_LEN: usize = 256;

/// The traced system call entry points.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub enum SyscallKind {
    Execve = 1,
    Execveat = 2,
    Open = 3,
    Unlink = 4,
    Chmod = 5,
    Mount = 6,
    Setuid = 7,
    Socket = 8,
    Connect = 9,
}

impl SyscallKind {
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Execve),
            2 => Some(Self::Execveat),
            3 => Some(Self::Open),
            4 => Some(Self::Unlink),
            5 => Some(Self::Chmod),
            6 => Some(Self::Mount),
            7 => Some(Self::Setuid),
            8 => Some(Self::Socket),
            9 => Some(Self::Connect),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Execve => "execve",
            Self::Execveat => "execveat",
            Self::Open => "open",
            Self::Unlink => "unlink",
            Self::Chmod => "chmod",
            Self::Mount => "mount",
            Self::Setuid => "setuid",
            Self::Socket => "socket",
            Self::Connect => "connect",
        }
    }
}

/// One traced syscall entry.
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(any(test, feature = "user"), derive(Debug))]
pub struct SyscallEvent {
    pub pid: u32,
    /// Numeric [`SyscallKind`].
    pub kind: u32,
    /// Task name, NUL padded.
    pub comm: [u8; TASK_COMM_LEN],
    /// Pathname argument where the syscall has one, NUL padded.
    pub path: [u8; SYSCALL_PATH_LEN],
}

impl SyscallEvent {
    pub const fn empty() -> Self {
        Self {
            pid: 0,
            kind: 0,
            comm: [0; TASK_COMM_LEN],
            path: [0; SYSCALL_PATH_LEN],
        }
    }
}

// Safety SyscallEvent is repr(C), Copy and free of references
#[cfg(feature = "user")]
unsafe impl aya::Pod for SyscallEvent {}
