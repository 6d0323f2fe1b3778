#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Group-based concurrency limiting for grouplimit
//!
//! A [`Limiter`] bounds how many operations may be in flight per named
//! group. Limits come from a caller-supplied [`LimitLookup`] and are cached
//! lazily; a group's record is dropped again as soon as its usage returns
//! to zero. Reservations span several groups at once and are granted
//! all-or-nothing.

mod group;
pub mod guard;
pub mod limiter;
pub mod lookup;

pub use guard::{OwnedReservation, Reservation};
pub use limiter::{GroupUsage, Limiter};
pub use lookup::{
    limit_from_sentinel, limit_to_sentinel, LimitLookup, SentinelLookup, UNLIMITED_SENTINEL,
};
