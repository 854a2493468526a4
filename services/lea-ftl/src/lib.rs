//! # lea-ftl - a learned, segment-based FTL mapping engine
//!
//! ## Glossary:
//! * LBA - Logical Block Address, the index a host uses to name a block.
//! * PPN - Physical Page Number, what the mapping resolves an LBA to. 0 is reserved
//!   to mean "unmapped", which is also what a read of a never-written LBA returns.
//! * Group - a fixed 256-LBA partition of the logical space. Every group owns its own
//!   mapping state and there are no cross-group invariants, so the group is the unit
//!   of everything interesting in this crate.
//! * Segment - a learned linear mapping `(start, length, step, base_ppn)` covering a
//!   strided run of offsets inside one group. One segment replaces up to 256 discrete
//!   map entries, which is the entire point of the exercise.
//! * Level - a layer of mutually non-overlapping segments within a group. Fresh
//!   segments land on top; segments they displace sink one level down, so recency
//!   decreases with depth.
//! * CRB - Conflict Record Buffer. The per-group spill store for points that don't
//!   fit any learned segment, kept as a flat byte array of offsets partitioned into
//!   sorted runs by a separator byte, with one base PPN per run.
//! * Bitmap - 256 bits per group steering each read to either the segment levels or
//!   the CRB, so the common case never pays for searching both.
//! * Write buffer - a 256-deep staging queue of LBAs. Flushing it is the only
//!   operation that learns segments, inserts CRB points, or consumes PPNs.
//!
//! ## Code Organization:
//!
//! ### `api.rs`
//! Everything shared with consumers of the engine: the size/shape constants, the
//! trace record types, the `FtlMap` trait that all mapping-table representations
//! implement, plus the error and statistics types.
//!
//! ### `backend.rs`
//! The engine internals. `bitmap.rs`, `crb.rs`, `segment.rs` and `group.rs` build up
//! the per-group state bottom-up; `buffer.rs` owns write staging and stride
//! detection; `learned.rs` ties the groups together into the primary engine.
//! `direct.rs` and `dftl.rs` are the simpler conformant representations kept around
//! for comparison runs -- same staging and allocation discipline, so all three
//! produce identical outputs for the same trace, outside the learned engine's
//! bounded-loss corners (depth-bound drops and the separator-offset collision).

pub mod api;
pub use api::*;
mod backend;
pub use backend::{DftlFtl, DirectFtl, LearnedFtl};
