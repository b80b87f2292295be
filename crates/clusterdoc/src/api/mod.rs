//! Raw payload types for the cluster API plus the typed fetch surface.
//! Payloads keep only the fields the diagnosis battery reads; maps are
//! `BTreeMap` so walks over them are deterministic.

pub mod meta;
pub mod stats;
