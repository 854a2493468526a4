use core::fmt;

/// Logical block address as presented by the trace. The mapping only defines
/// behavior for `lba < (LBA_GROUPS * LBAS_PER_GROUP)`; everything above is rejected.
pub type Lba = u64;
/// Physical page number. 0 is reserved as the "unmapped" return value, which works
/// out because the allocator starts well above it.
pub type Ppn = u64;

/// Number of LBAs per group. The group offset must fit in a u8 and the occupancy
/// bitmap is sized to exactly one offset per bit, so this is not a free parameter.
pub const LBAS_PER_GROUP: usize = 256;
/// Fixed size of the group array, created up front at init. Together with
/// LBAS_PER_GROUP this bounds the addressable space at 64M LBAs.
pub const LBA_GROUPS: usize = 250_000;
/// Depth of the write-staging buffer. Flush is triggered by hitting this depth, by
/// a read that collides with a staged LBA, or explicitly by the driver.
pub const WRITE_BUFFER_DEPTH: usize = 256;
/// Displacement bound for segment insertion. A segment pushed below the last level
/// is dropped rather than chased forever; the loss is counted, never an error.
pub const MAX_INSERT_DEPTH: usize = 16;
/// First PPN handed out by the allocator. PPNs are never reused -- this is a
/// mapping simulator, not a device, so there is no reclamation.
pub const FIRST_PPN: u32 = 1000;
/// Upper bound on the number of IOs a single trace may declare.
pub const MAX_IO_COUNT: usize = 10_000_000;

/// Discriminator for one trace record. The numeric values are the on-disk trace
/// encoding and cannot be changed.
#[derive(num_derive::FromPrimitive, num_derive::ToPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
pub enum IoKind {
    Read = 0,
    Write = 1,
}
impl IoKind {
    pub fn decode(code: u32) -> Option<IoKind> { num_traits::FromPrimitive::from_u32(code) }
}

/// One parsed line of a trace file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IoRecord {
    pub kind: IoKind,
    pub lba: Lba,
    /// The PPN column of the trace. Parsed for completeness, but the engines
    /// allocate their own physical pages and never consult it.
    pub ppn: Ppn,
}

/// Errors surfaced by the engine API. Both are non-fatal to a replay: the driver
/// logs the failed write and keeps going.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FtlError {
    /// The LBA's group falls outside the fixed group array.
    InvalidLba(Lba),
    /// The staging buffer is full and could not be drained.
    BufferFull,
}
impl fmt::Display for FtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtlError::InvalidLba(lba) => write!(f, "lba {} is beyond the mapped range", lba),
            FtlError::BufferFull => write!(f, "write buffer is full and cannot be drained"),
        }
    }
}
impl std::error::Error for FtlError {}

/// Tracks an estimate of live heap consumption, with a high-water mark. This exists
/// purely for the benchmark report; nothing in the engine keys off of it.
#[derive(Debug, Default, Copy, Clone)]
pub struct MemGauge {
    used: u64,
    max: u64,
}
impl MemGauge {
    pub fn charge(&mut self, bytes: usize) {
        self.used += bytes as u64;
        if self.used > self.max {
            self.max = self.used;
        }
    }

    pub fn credit(&mut self, bytes: usize) { self.used = self.used.saturating_sub(bytes as u64); }

    pub fn used(&self) -> u64 { self.used }

    pub fn max(&self) -> u64 { self.max }
}

/// Benchmarking counters reported by every engine. Fields that don't apply to a
/// given representation simply stay zero.
#[derive(Debug, Default, Copy, Clone)]
pub struct FtlStats {
    /// current estimated heap bytes owned by the mapping
    pub mem_used: u64,
    /// high-water mark of `mem_used`
    pub mem_max: u64,
    /// number of non-empty flushes performed
    pub flushes: u64,
    /// strided runs promoted to segments
    pub segments_learned: u64,
    /// singleton writes recorded in a CRB
    pub crb_points: u64,
    /// segments displaced past the bottom level and dropped
    pub segments_lost: u64,
    /// CRB points that collide with the run separator and cannot be stored
    pub crb_points_dropped: u64,
}

/// The operational contract shared by every mapping-table representation.
///
/// Constructing an engine is `Init`; dropping it is `Destroy` (all state is owned,
/// nothing outlives the engine). `flush` is idempotent on an empty buffer. Writes
/// are observed by reads only after the next flush boundary, except that `read`
/// eagerly flushes when its target is still staged, so `write(x); read(x)` always
/// returns the freshly allocated PPN.
pub trait FtlMap {
    /// Resolves an LBA to its PPN. Returns 0 for an unmapped or out-of-range LBA.
    fn read(&mut self, lba: Lba) -> Ppn;
    /// Stages one write. The physical page is not reserved until the flush.
    fn write(&mut self, lba: Lba) -> Result<(), FtlError>;
    /// Drains the staging buffer into the mapping store.
    fn flush(&mut self);
    fn stats(&self) -> FtlStats;
}
