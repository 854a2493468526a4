use core::mem::size_of;
use std::collections::HashMap;

use crate::api::*;
use crate::backend::WriteBuffer;

/// One mapping page: a plain PPN per offset, 0 meaning unmapped.
type MapPage = Box<[u32; LBAS_PER_GROUP]>;

/// The plain per-group array representation. No learning, no levels: every write
/// costs one table slot. Mapping pages are allocated on first touch rather than up
/// front, which keeps sparse traces from paying for the whole 64M-entry table.
///
/// It shares the staging buffer and the sorted-flush allocation discipline with the
/// learned engine, so both produce identical outputs for the same trace; this is
/// what makes it useful as a comparison baseline.
pub struct DirectFtl {
    pages: HashMap<u32, MapPage>,
    buffer: WriteBuffer,
    next_ppn: u32,
    mem: MemGauge,
    flushes: u64,
}

impl DirectFtl {
    pub fn new() -> Self {
        let mut mem = MemGauge::default();
        mem.charge(size_of::<Self>());
        DirectFtl {
            pages: HashMap::new(),
            buffer: WriteBuffer::new(),
            next_ppn: FIRST_PPN,
            mem,
            flushes: 0,
        }
    }

    fn in_range(lba: Lba) -> bool { (lba / LBAS_PER_GROUP as Lba) < LBA_GROUPS as Lba }

    fn flush_inner(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = self.buffer.drain_sorted();
        let mut current_ppn = self.next_ppn;
        for &lba in batch.iter() {
            let group = (lba / LBAS_PER_GROUP as Lba) as u32;
            let offset = (lba % LBAS_PER_GROUP as Lba) as usize;
            let mem = &mut self.mem;
            let page = self.pages.entry(group).or_insert_with(|| {
                mem.charge(size_of::<u32>() * LBAS_PER_GROUP);
                Box::new([0u32; LBAS_PER_GROUP])
            });
            page[offset] = current_ppn;
            current_ppn += 1;
        }
        log::debug!(
            "flush: {} staged lbas -> ppns [{}, {})",
            batch.len(),
            self.next_ppn,
            current_ppn
        );
        self.next_ppn = current_ppn;
        self.flushes += 1;
    }
}

impl Default for DirectFtl {
    fn default() -> Self { Self::new() }
}

impl FtlMap for DirectFtl {
    fn read(&mut self, lba: Lba) -> Ppn {
        if self.buffer.contains(lba) {
            self.flush_inner();
        }
        if !Self::in_range(lba) {
            log::warn!("read of lba {} beyond the mapped range", lba);
            return 0;
        }
        let group = (lba / LBAS_PER_GROUP as Lba) as u32;
        let offset = (lba % LBAS_PER_GROUP as Lba) as usize;
        self.pages.get(&group).map_or(0, |page| page[offset] as Ppn)
    }

    fn write(&mut self, lba: Lba) -> Result<(), FtlError> {
        if !Self::in_range(lba) {
            return Err(FtlError::InvalidLba(lba));
        }
        if self.buffer.is_full() {
            self.flush_inner();
        }
        self.buffer.push(lba)
    }

    fn flush(&mut self) { self.flush_inner() }

    fn stats(&self) -> FtlStats {
        FtlStats {
            mem_used: self.mem.used(),
            mem_max: self.mem.max(),
            flushes: self.flushes,
            ..FtlStats::default()
        }
    }
}
