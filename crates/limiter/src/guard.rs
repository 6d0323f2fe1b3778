//! RAII reservations
//!
//! Guards hand their groups back to the limiter when dropped, mirroring how
//! semaphore permits behave.

use crate::limiter::Limiter;
use std::sync::Arc;

/// A granted reservation borrowed from a [`Limiter`]
#[derive(Debug)]
#[must_use = "dropping a reservation releases it immediately"]
pub struct Reservation<'a> {
    limiter: &'a Limiter,
    names: Vec<String>,
}

impl<'a> Reservation<'a> {
    pub(crate) fn new(limiter: &'a Limiter, names: Vec<String>) -> Self {
        Self { limiter, names }
    }

    /// Groups held by this reservation
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Release now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.limiter.release(&self.names);
    }
}

/// A granted reservation that keeps its [`Limiter`] alive
#[derive(Debug)]
#[must_use = "dropping a reservation releases it immediately"]
pub struct OwnedReservation {
    limiter: Arc<Limiter>,
    names: Vec<String>,
}

impl OwnedReservation {
    pub(crate) fn new(limiter: Arc<Limiter>, names: Vec<String>) -> Self {
        Self { limiter, names }
    }

    /// Groups held by this reservation
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Release now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for OwnedReservation {
    fn drop(&mut self) {
        self.limiter.release(&self.names);
    }
}
