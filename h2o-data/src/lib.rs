//! Flux arithmetic for the basin water balance.
//!
//! This crate turns already-decoded series into annual fluxes in mm per year
//! and combines them. It does no file I/O.

pub mod aggregate;
pub mod balance;
pub mod runoff;
