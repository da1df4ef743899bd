//! Session leases.
//!
//! A query either borrows the connection's shared session (pooling) or clones a
//! private one. A private session is wrapped in a [`SessionLease`] shared by the query
//! and any cursor it produced; the lease closes the session once, when the last holder
//! lets go of it.

use crate::errors::{DbError, DriverError, StoreOp};
use crate::store::{StoreCollection, StoreSession};
use crate::types::SessionId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct SessionLease {
    session: Arc<dyn StoreSession>,
    pooled: bool,
    closed: AtomicBool,
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.session.id())
            .field("pooled", &self.pooled)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl SessionLease {
    /// Borrows a shared session. The lease never closes it.
    #[must_use]
    pub fn pooled(session: Arc<dyn StoreSession>) -> Arc<Self> {
        Arc::new(Self { session, pooled: true, closed: AtomicBool::new(false) })
    }

    /// Clones a private session from `shared`, owned by this lease.
    ///
    /// # Errors
    /// Returns `DbError::Store` when the driver cannot clone the session.
    pub fn cloned(shared: &dyn StoreSession) -> Result<Arc<Self>, DbError> {
        let session = shared.clone_session().map_err(|e| DbError::store(StoreOp::Session, &e))?;
        log::debug!("cloned session {} from {}", session.id(), shared.id());
        Ok(Arc::new(Self { session, pooled: false, closed: AtomicBool::new(false) }))
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    #[must_use]
    pub const fn is_pooled(&self) -> bool {
        self.pooled
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Binds a collection to the leased session.
    ///
    /// # Errors
    /// Returns `DbError::Store` when the session is closed or the driver refuses.
    pub fn collection(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Arc<dyn StoreCollection>, DbError> {
        if self.is_closed() {
            return Err(DbError::store(StoreOp::Session, &DriverError::SessionClosed));
        }
        self.session.collection(database, name).map_err(|e| DbError::store(StoreOp::Session, &e))
    }

    /// Closes a private session. Pooled sessions and repeated calls are no-ops.
    pub(crate) fn close(&self) {
        if self.pooled {
            return;
        }
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::debug!("closing session {}", self.session.id());
            self.session.close();
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.close();
    }
}
