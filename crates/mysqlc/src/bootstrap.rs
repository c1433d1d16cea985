//! Process-level library lifecycle.
//!
//! The C client library carries a process-wide "server initialized" flag
//! that every connection implicitly depends on. Here that state is an
//! explicit handle: [`Library::init`] produces it, connecting requires a
//! reference to it, and [`Library::shutdown`] (or dropping the handle)
//! releases it. Initializing twice is a programming error.

use std::sync::atomic::{AtomicBool, Ordering};

use mysqlc_core::{Error, Result};

use crate::config::MySqlConfig;
use crate::connection::Connection;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Handle proving the client library has been initialized.
#[derive(Debug)]
pub struct Library {
    _private: (),
}

impl Library {
    /// Initialize the client library.
    ///
    /// Fails with a programming error if the library is already
    /// initialized in this process.
    pub fn init() -> Result<Self> {
        if INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::programming("already initialized"));
        }
        Ok(Self { _private: () })
    }

    /// Shut the library down, allowing a later re-initialization.
    ///
    /// Dropping the handle has the same effect.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Open a connection with this library.
    pub fn connect(&self, config: MySqlConfig) -> Result<Connection> {
        Connection::connect(self, config)
    }

    /// Whether the driver is safe to use from multiple threads (one
    /// connection per thread). Always true; kept for API parity with the
    /// C client.
    pub const fn thread_safe() -> bool {
        true
    }

    /// Client library version string.
    pub const fn client_info() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        INITIALIZED.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test drives the whole lifecycle; the guard is process-global
    // state, so splitting these assertions across tests would race.
    #[test]
    fn init_shutdown_lifecycle() {
        let lib = Library::init().expect("first init");

        let err = Library::init().unwrap_err();
        assert!(err.is_programming());
        assert_eq!(err.to_string(), "programming error: already initialized");

        lib.shutdown();

        let again = Library::init().expect("re-init after shutdown");
        drop(again);
        let once_more = Library::init().expect("re-init after drop");
        drop(once_more);

        assert!(Library::thread_safe());
        assert!(!Library::client_info().is_empty());
    }
}
