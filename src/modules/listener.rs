//! Listening socket shared by the server modules.
//!
//! # Design Decisions
//! - Enabled servers bind at construction so address errors surface during
//!   bootstrap and the identity carries the real port
//! - Disabled servers stay pending and never take their port; a pending
//!   socket binds on `take` if the module is run anyway

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use crate::BoxError;

enum State {
    Pending,
    Bound(std::net::TcpListener),
    Taken,
}

pub(crate) struct Socket {
    addr: SocketAddr,
    state: Mutex<State>,
}

impl Socket {
    /// Bind `addr` now. Port 0 resolves to the chosen port.
    pub(crate) fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            addr: listener.local_addr()?,
            state: Mutex::new(State::Bound(listener)),
        })
    }

    /// Remember `addr` without binding it.
    pub(crate) fn pending(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: Mutex::new(State::Pending),
        }
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn is_bound(&self) -> bool {
        matches!(*self.lock(), State::Bound(_))
    }

    /// Hand the listener to the serving task, binding a pending socket first.
    ///
    /// Fails on the second call.
    pub(crate) fn take(&self) -> Result<tokio::net::TcpListener, BoxError> {
        let state = std::mem::replace(&mut *self.lock(), State::Taken);
        let listener = match state {
            State::Bound(listener) => listener,
            State::Pending => {
                let listener = std::net::TcpListener::bind(self.addr)?;
                listener.set_nonblocking(true)?;
                listener
            }
            State::Taken => return Err(BoxError::from(format!("listener on {} already taken", self.addr))),
        };
        Ok(tokio::net::TcpListener::from_std(listener)?)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
