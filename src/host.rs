//! The host-link byte stream.
//!
//! The adapter presents one bidirectional, line-oriented byte stream to
//! the controlling computer.  On hardware this is the USB CDC-ACM port;
//! in tests it is a pair of in-memory buffers.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use core::fmt;

/// One bidirectional host link.
///
/// `poll_byte` never blocks: the main service loop owns all waiting.
/// Writes may block briefly in platform implementations (the USB task
/// drains the other end), but are assumed to complete.
pub trait HostPort {
    /// Fetch the next byte from the host, if one has arrived.
    fn poll_byte(&mut self) -> Option<u8>;

    /// Write raw bytes towards the host.
    fn write_all(&mut self, bytes: &[u8]);
}

/// Adapter so responses can be produced with `core::write!`.
pub struct Fmt<'a>(pub &'a mut dyn HostPort);

impl fmt::Write for Fmt<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_all(s.as_bytes());
        Ok(())
    }
}

/// Format one response line, terminated the way the serial console
/// expects.
macro_rules! respond {
    ($host:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let _ = core::write!($crate::host::Fmt(&mut *$host), $($arg)*);
        $host.write_all(b"\r\n");
    }};
}
pub(crate) use respond;

#[cfg(test)]
pub(crate) mod testutil {
    use super::HostPort;

    /// In-memory host link for tests: bytes queued with [`MockHost::feed`]
    /// come back out of `poll_byte`, and everything the firmware writes is
    /// captured in `tx`.
    #[derive(Default)]
    pub struct MockHost {
        rx: std::collections::VecDeque<u8>,
        pub tx: Vec<u8>,
    }

    impl MockHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn feed(&mut self, bytes: &[u8]) {
            self.rx.extend(bytes.iter().copied());
        }

        pub fn output(&self) -> &str {
            core::str::from_utf8(&self.tx).expect("non-UTF8 host output")
        }

        pub fn clear_output(&mut self) {
            self.tx.clear();
        }
    }

    impl HostPort for MockHost {
        fn poll_byte(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }

        fn write_all(&mut self, bytes: &[u8]) {
            self.tx.extend_from_slice(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::MockHost;
    use super::*;

    #[test]
    fn respond_appends_line_ending() {
        let mut host = MockHost::new();
        {
            let h: &mut dyn HostPort = &mut host;
            respond!(h, "addr {}", 9);
        }
        assert_eq!(host.output(), "addr 9\r\n");
    }
}
