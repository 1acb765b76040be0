use std::cell::RefCell;
use std::io;
use std::ops::{Index, IndexMut};

macro_rules! counters {
    ($($variant:ident => ($name:literal, $description:literal)),+ $(,)?) => {
        /// Statistic kept per thread by the instrumented calls.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Counter {
            $($variant),+
        }

        impl Counter {
            pub const ALL: &'static [Counter] = &[$(Counter::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Counter::$variant => $name),+
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $(Counter::$variant => $description),+
                }
            }
        }
    };
}

counters! {
    ReadBytes => ("READ_BYTES", "Bytes read"),
    ReadCalls => ("READ_CALLS", "Number of read calls"),
    ReadErr => ("READ_ERR", "Number of read calls that resulted in an error"),
    ReadInterrupted => ("READ_INTERRUPTED", "Number of read calls that timed out or were interrupted"),
    ReadWouldBlock => ("READ_WOULD_BLOCK", "Number of read calls that would have blocked"),
    ReadShort => ("READ_SHORT", "Number of read calls that returned less bytes than requested"),
    ReadEof => ("READ_EOF", "Number of read calls that returned an EOF"),
    ReadBlockSize => ("READ_BLOCK_SIZE", "Average block size of reads"),
    ReadUsec => ("READ_USEC", "Real microseconds spent in reads"),
    WriteBytes => ("WRITE_BYTES", "Bytes written"),
    WriteCalls => ("WRITE_CALLS", "Number of write calls"),
    WriteErr => ("WRITE_ERR", "Number of write calls that resulted in an error"),
    WriteShort => ("WRITE_SHORT", "Number of write calls that wrote less bytes than requested"),
    WriteInterrupted => ("WRITE_INTERRUPTED", "Number of write calls that timed out or were interrupted"),
    WriteWouldBlock => ("WRITE_WOULD_BLOCK", "Number of write calls that would have blocked"),
    WriteBlockSize => ("WRITE_BLOCK_SIZE", "Mean block size of writes"),
    WriteUsec => ("WRITE_USEC", "Real microseconds spent in writes"),
    OpenCalls => ("OPEN_CALLS", "Number of open calls"),
    OpenErr => ("OPEN_ERR", "Number of open calls that resulted in an error"),
    OpenFds => ("OPEN_FDS", "Number of currently open descriptors"),
    PollUsec => ("POLL_USEC", "Real microseconds spent in poll calls"),
    RecvBytes => ("RECV_BYTES", "Bytes read in recv calls"),
    RecvCalls => ("RECV_CALLS", "Number of recv calls"),
    RecvErr => ("RECV_ERR", "Number of recv calls that resulted in an error"),
    RecvInterrupted => ("RECV_INTERRUPTED", "Number of recv calls that timed out or were interrupted"),
    RecvWouldBlock => ("RECV_WOULD_BLOCK", "Number of recv calls that would have blocked"),
    RecvShort => ("RECV_SHORT", "Number of recv calls that returned less bytes than requested"),
    RecvEof => ("RECV_EOF", "Number of recv calls that returned an EOF"),
    RecvBlockSize => ("RECV_BLOCK_SIZE", "Average block size of recv calls"),
    RecvUsec => ("RECV_USEC", "Real microseconds spent in recv calls"),
    SendBytes => ("SEND_BYTES", "Bytes written in send calls"),
    SendCalls => ("SEND_CALLS", "Number of send calls"),
    SendErr => ("SEND_ERR", "Number of send calls that resulted in an error"),
    SendInterrupted => ("SEND_INTERRUPTED", "Number of send calls that timed out or were interrupted"),
    SendWouldBlock => ("SEND_WOULD_BLOCK", "Number of send calls that would have blocked"),
    SendShort => ("SEND_SHORT", "Number of send calls that wrote less bytes than requested"),
    SendBlockSize => ("SEND_BLOCK_SIZE", "Average block size of send calls"),
    SendUsec => ("SEND_USEC", "Real microseconds spent in send calls"),
    SockReadBytes => ("SOCK_READ_BYTES", "Bytes read from socket"),
    SockReadCalls => ("SOCK_READ_CALLS", "Number of read calls on socket"),
    SockReadErr => ("SOCK_READ_ERR", "Number of read calls on socket that resulted in an error"),
    SockReadShort => ("SOCK_READ_SHORT", "Number of read calls on socket that returned less bytes than requested"),
    SockReadWouldBlock => ("SOCK_READ_WOULD_BLOCK", "Number of read calls on socket that would have blocked"),
    SockReadUsec => ("SOCK_READ_USEC", "Real microseconds spent in read(s) on socket(s)"),
    SockWriteBytes => ("SOCK_WRITE_BYTES", "Bytes written to socket"),
    SockWriteCalls => ("SOCK_WRITE_CALLS", "Number of write calls to socket"),
    SockWriteErr => ("SOCK_WRITE_ERR", "Number of write calls to socket that resulted in an error"),
    SockWriteShort => ("SOCK_WRITE_SHORT", "Number of write calls to socket that wrote less bytes than requested"),
    SockWriteWouldBlock => ("SOCK_WRITE_WOULD_BLOCK", "Number of write calls to socket that would have blocked"),
    SockWriteUsec => ("SOCK_WRITE_USEC", "Real microseconds spent in write(s) to socket(s)"),
    SeekCalls => ("SEEK_CALLS", "Number of seek calls"),
    SeekAbsStrideSize => ("SEEK_ABS_STRIDE_SIZE", "Average absolute stride size of seeks"),
    SeekUsec => ("SEEK_USEC", "Real microseconds spent in seek calls"),
}

impl Counter {
    pub fn unit(self) -> &'static str {
        let name = self.name();
        if name.ends_with("_USEC") {
            "usec"
        } else if name.ends_with("_BYTES") || name.ends_with("_SIZE") {
            "bytes"
        } else {
            ""
        }
    }
}

/// Counters touched by one family of data transfer calls.
pub(crate) struct Transfer {
    calls: Counter,
    bytes: Counter,
    err: Counter,
    short: Counter,
    would_block: Counter,
    usec: Counter,
    interrupted: Option<Counter>,
    eof: Option<Counter>,
    block_size: Option<Counter>,
    // Zero bytes transferred means end of file, not a short transfer.
    inbound: bool,
    // EAGAIN on a non-blocking descriptor counts as would-block.
    again: bool,
}

pub(crate) const READ: Transfer = Transfer {
    calls: Counter::ReadCalls,
    bytes: Counter::ReadBytes,
    err: Counter::ReadErr,
    short: Counter::ReadShort,
    would_block: Counter::ReadWouldBlock,
    usec: Counter::ReadUsec,
    interrupted: Some(Counter::ReadInterrupted),
    eof: Some(Counter::ReadEof),
    block_size: Some(Counter::ReadBlockSize),
    inbound: true,
    again: false,
};

pub(crate) const SOCK_READ: Transfer = Transfer {
    calls: Counter::SockReadCalls,
    bytes: Counter::SockReadBytes,
    err: Counter::SockReadErr,
    short: Counter::SockReadShort,
    would_block: Counter::SockReadWouldBlock,
    usec: Counter::SockReadUsec,
    interrupted: None,
    eof: None,
    block_size: None,
    inbound: true,
    again: false,
};

pub(crate) const WRITE: Transfer = Transfer {
    calls: Counter::WriteCalls,
    bytes: Counter::WriteBytes,
    err: Counter::WriteErr,
    short: Counter::WriteShort,
    would_block: Counter::WriteWouldBlock,
    usec: Counter::WriteUsec,
    interrupted: Some(Counter::WriteInterrupted),
    eof: None,
    block_size: Some(Counter::WriteBlockSize),
    inbound: false,
    again: false,
};

pub(crate) const SOCK_WRITE: Transfer = Transfer {
    calls: Counter::SockWriteCalls,
    bytes: Counter::SockWriteBytes,
    err: Counter::SockWriteErr,
    short: Counter::SockWriteShort,
    would_block: Counter::SockWriteWouldBlock,
    usec: Counter::SockWriteUsec,
    interrupted: None,
    eof: None,
    block_size: None,
    inbound: false,
    again: false,
};

pub(crate) const RECV: Transfer = Transfer {
    calls: Counter::RecvCalls,
    bytes: Counter::RecvBytes,
    err: Counter::RecvErr,
    short: Counter::RecvShort,
    would_block: Counter::RecvWouldBlock,
    usec: Counter::RecvUsec,
    interrupted: Some(Counter::RecvInterrupted),
    eof: Some(Counter::RecvEof),
    block_size: Some(Counter::RecvBlockSize),
    inbound: true,
    again: true,
};

pub(crate) const SEND: Transfer = Transfer {
    calls: Counter::SendCalls,
    bytes: Counter::SendBytes,
    err: Counter::SendErr,
    short: Counter::SendShort,
    would_block: Counter::SendWouldBlock,
    usec: Counter::SendUsec,
    interrupted: Some(Counter::SendInterrupted),
    eof: None,
    block_size: Some(Counter::SendBlockSize),
    inbound: false,
    again: true,
};

/// One value per [`Counter`], indexed by the counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stats([i64; Counter::ALL.len()]);

impl Default for Stats {
    fn default() -> Self {
        Self([0; Counter::ALL.len()])
    }
}

impl Index<Counter> for Stats {
    type Output = i64;

    fn index(&self, counter: Counter) -> &i64 {
        &self.0[counter as usize]
    }
}

impl IndexMut<Counter> for Stats {
    fn index_mut(&mut self, counter: Counter) -> &mut i64 {
        &mut self.0[counter as usize]
    }
}

impl Stats {
    /// Bumps `counter` and returns its previous value.
    fn bump(&mut self, counter: Counter) -> i64 {
        let old = self[counter];
        self[counter] += 1;
        old
    }

    /// Folds `sample` into the running mean held in `counter` over `n` prior samples.
    fn mean(&mut self, counter: Counter, n: i64, sample: i64) {
        let n = n as i128;
        let mean = (n * self[counter] as i128 + sample as i128) / (n + 1);
        self[counter] = mean as i64;
    }

    /// A zero-timeout readiness probe found the descriptor not ready.
    pub(crate) fn blocked(&mut self, t: &Transfer) {
        self[t.would_block] += 1;
    }

    pub(crate) fn transfer(&mut self, t: &Transfer, requested: usize, result: &io::Result<usize>, usec: i64) {
        let n = self.bump(t.calls);
        match result {
            Ok(0) if t.inbound => {
                if let Some(eof) = t.eof {
                    self[eof] += 1;
                }
            }
            Ok(done) => {
                if let Some(block_size) = t.block_size {
                    self.mean(block_size, n, requested as i64);
                }
                self[t.bytes] += *done as i64;
                if *done < requested {
                    self[t.short] += 1;
                }
                self[t.usec] += usec;
            }
            Err(e) => {
                self[t.err] += 1;
                match e.raw_os_error() {
                    Some(libc::EINTR) => {
                        if let Some(interrupted) = t.interrupted {
                            self[interrupted] += 1;
                        }
                    }
                    Some(libc::EAGAIN) if t.again => self[t.would_block] += 1,
                    _ => {}
                }
            }
        }
    }

    pub(crate) fn seek(&mut self, offset: i64, usec: i64) {
        let n = self.bump(Counter::SeekCalls);
        self[Counter::SeekUsec] += usec;
        self.mean(Counter::SeekAbsStrideSize, n, offset.saturating_abs());
    }

    pub(crate) fn open(&mut self, ok: bool) {
        self[Counter::OpenCalls] += 1;
        if ok {
            self[Counter::OpenFds] += 1;
        } else {
            self[Counter::OpenErr] += 1;
        }
    }

    pub(crate) fn close(&mut self) {
        if self[Counter::OpenFds] > 0 {
            self[Counter::OpenFds] -= 1;
        }
    }

    pub(crate) fn poll(&mut self, usec: i64) {
        self[Counter::PollUsec] += usec;
    }
}

thread_local! {
    static STATS: RefCell<Stats> = RefCell::new(Stats::default());
}

/// Applies `f` to the calling thread's statistics.
///
/// Does nothing while the thread is being torn down or when re-entered.
pub(crate) fn update(f: impl FnOnce(&mut Stats)) {
    let _ = STATS.try_with(|it| {
        if let Ok(mut stats) = it.try_borrow_mut() {
            f(&mut stats);
        }
    });
}

/// Copy of the calling thread's statistics.
pub fn snapshot() -> Stats {
    STATS
        .try_with(|it| it.try_borrow().map(|it| it.clone()).unwrap_or_default())
        .unwrap_or_default()
}

/// Zeroes the calling thread's statistics.
pub fn clear() {
    update(|stats| *stats = Stats::default());
}
