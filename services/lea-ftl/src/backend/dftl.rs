use core::mem::size_of;
use std::collections::HashMap;
use std::num::NonZeroUsize;

use bitfield::bitfield;
use lru::LruCache;

use crate::api::*;
use crate::backend::WriteBuffer;

/// Number of mapping pages the translation cache keeps resident.
const TRANSLATION_CACHE_PAGES: usize = 16;

bitfield! {
    /// One packed map slot: 31 bits of PPN plus a valid flag. The valid bit is
    /// technically redundant (PPN 0 already means unmapped) but it keeps the slot
    /// readable without knowing the allocator's base, and it models what a real
    /// demand-paged table stores per entry.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct MapSlot(u32);
    impl Debug;
    pub u32, ppn, set_ppn: 30, 0;
    pub valid, set_valid: 31;
}

type MapPage = Box<[MapSlot; LBAS_PER_GROUP]>;

fn blank_page() -> MapPage { Box::new([MapSlot(0); LBAS_PER_GROUP]) }

/// A demand-paged rendition of the direct table: the backing store holds every
/// mapping page, and a small LRU of resident pages fronts it, modeling a cached
/// mapping table whose misses would cost a flash read on a real device. Eviction
/// writes the page back to the backing store.
///
/// Translation results are identical to `DirectFtl`; only the cache traffic
/// differs, which is the point of keeping this variant around.
pub struct DftlFtl {
    backing: HashMap<u32, MapPage>,
    resident: LruCache<u32, MapPage>,
    buffer: WriteBuffer,
    next_ppn: u32,
    mem: MemGauge,
    flushes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl DftlFtl {
    pub fn new() -> Self {
        let mut mem = MemGauge::default();
        mem.charge(size_of::<Self>());
        DftlFtl {
            backing: HashMap::new(),
            resident: LruCache::new(NonZeroUsize::new(TRANSLATION_CACHE_PAGES).unwrap()),
            buffer: WriteBuffer::new(),
            next_ppn: FIRST_PPN,
            mem,
            flushes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn in_range(lba: Lba) -> bool { (lba / LBAS_PER_GROUP as Lba) < LBA_GROUPS as Lba }

    /// Makes `group`'s page resident and returns it, faulting it in from the
    /// backing store (or minting a blank page) on a miss. The page evicted to make
    /// room goes back to the backing store.
    fn fault_in(&mut self, group: u32) -> &mut MapPage {
        if self.resident.contains(&group) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let page = match self.backing.remove(&group) {
                Some(page) => page,
                None => {
                    self.mem.charge(size_of::<MapSlot>() * LBAS_PER_GROUP);
                    blank_page()
                }
            };
            if let Some((evicted_group, evicted_page)) = self.resident.push(group, page) {
                if evicted_group != group {
                    self.evictions += 1;
                    self.backing.insert(evicted_group, evicted_page);
                }
            }
        }
        self.resident.get_mut(&group).expect("page was just made resident")
    }

    fn flush_inner(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = self.buffer.drain_sorted();
        let mut current_ppn = self.next_ppn;
        for &lba in batch.iter() {
            let group = (lba / LBAS_PER_GROUP as Lba) as u32;
            let offset = (lba % LBAS_PER_GROUP as Lba) as usize;
            let slot = &mut self.fault_in(group)[offset];
            slot.set_ppn(current_ppn);
            slot.set_valid(true);
            current_ppn += 1;
        }
        log::debug!(
            "flush: {} staged lbas -> ppns [{}, {}); cache {} hits / {} misses / {} evictions",
            batch.len(),
            self.next_ppn,
            current_ppn,
            self.hits,
            self.misses,
            self.evictions
        );
        self.next_ppn = current_ppn;
        self.flushes += 1;
    }
}

impl Default for DftlFtl {
    fn default() -> Self { Self::new() }
}

impl Drop for DftlFtl {
    fn drop(&mut self) {
        log::debug!(
            "translation cache: {} hits, {} misses, {} evictions over {} flushes",
            self.hits,
            self.misses,
            self.evictions,
            self.flushes
        );
    }
}

impl FtlMap for DftlFtl {
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
        // a read of a never-written group should not fault a blank page resident
        if !self.resident.contains(&group) && !self.backing.contains_key(&group) {
            return 0;
        }
        let slot = self.fault_in(group)[offset];
        if slot.valid() { slot.ppn() as Ppn } else { 0 }
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
