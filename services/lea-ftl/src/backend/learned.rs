use core::mem::size_of;

use crate::api::*;
use crate::backend::{extract_runs, GroupTable, InsertOutcome, Run, Segment, WriteBuffer};

/// The learned, multi-level, segment-based mapping engine.
///
/// Writes stage in the buffer and cost nothing until a flush boundary. The flush
/// sorts the batch, carves it into per-group equal-stride runs, and records each
/// run as either a learned segment or a CRB point, reserving physical pages in
/// batch order from a monotonic allocator. Reads dispatch through the per-group
/// occupancy bitmap, after an eager flush if the target is still staged.
pub struct LearnedFtl {
    groups: Vec<GroupTable>,
    buffer: WriteBuffer,
    next_ppn: u32,
    mem: MemGauge,
    flushes: u64,
    segments_learned: u64,
    crb_points: u64,
    segments_lost: u64,
    crb_points_dropped: u64,
}

impl LearnedFtl {
    pub fn new() -> Self {
        let mut groups = Vec::with_capacity(LBA_GROUPS);
        groups.resize_with(LBA_GROUPS, GroupTable::default);
        let mut mem = MemGauge::default();
        mem.charge(LBA_GROUPS * size_of::<GroupTable>());
        LearnedFtl {
            groups,
            buffer: WriteBuffer::new(),
            next_ppn: FIRST_PPN,
            mem,
            flushes: 0,
            segments_learned: 0,
            crb_points: 0,
            segments_lost: 0,
            crb_points_dropped: 0,
        }
    }

    fn in_range(lba: Lba) -> bool { (lba / LBAS_PER_GROUP as Lba) < LBA_GROUPS as Lba }

    fn flush_inner(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = self.buffer.drain_sorted();
        let mut current_ppn = self.next_ppn;
        for run in extract_runs(&batch) {
            match run {
                Run::Strided { group, start, length, step, pages } => {
                    let seg = Segment { start, length, step, base_ppn: current_ppn };
                    self.mem.charge(size_of::<Segment>());
                    self.segments_learned += 1;
                    match self.groups[group as usize].learn_segment(seg) {
                        InsertOutcome::Placed { depth } => {
                            log::trace!(
                                "group {}: learned segment {:?} at level {}",
                                group,
                                seg,
                                depth
                            );
                        }
                        InsertOutcome::Dropped { lost } => {
                            self.segments_lost += 1;
                            self.mem.credit(size_of::<Segment>());
                            log::warn!(
                                "group {}: displaced segment {:?} fell past level {}, dropped",
                                group,
                                lost,
                                MAX_INSERT_DEPTH
                            );
                        }
                    }
                    current_ppn += pages;
                }
                Run::Point { group, offset } => {
                    let before = self.groups[group as usize].footprint();
                    let dropped = self.groups[group as usize].learn_point(offset, current_ppn);
                    if dropped > 0 {
                        self.crb_points_dropped += dropped as u64;
                        log::warn!(
                            "group {}: offset {} collides with the CRB run separator, mapping dropped",
                            group,
                            offset
                        );
                    } else {
                        self.crb_points += 1;
                        self.mem.charge(self.groups[group as usize].footprint() - before);
                    }
                    current_ppn += 1;
                }
            }
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

impl Default for LearnedFtl {
    fn default() -> Self { Self::new() }
}

impl FtlMap for LearnedFtl {
    fn read(&mut self, lba: Lba) -> Ppn {
        if self.buffer.contains(lba) {
            log::trace!("read of staged lba {}: eager flush", lba);
            self.flush_inner();
        }
        if !Self::in_range(lba) {
            log::warn!("read of lba {} beyond the mapped range", lba);
            return 0;
        }
        let group = (lba / LBAS_PER_GROUP as Lba) as usize;
        self.groups[group].lookup((lba % LBAS_PER_GROUP as Lba) as u8)
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
            segments_learned: self.segments_learned,
            crb_points: self.crb_points,
            segments_lost: self.segments_lost,
            crb_points_dropped: self.crb_points_dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::backend::{DftlFtl, DirectFtl};

    fn write_all(ftl: &mut impl FtlMap, lbas: &[Lba]) {
        for &lba in lbas {
            ftl.write(lba).unwrap();
        }
    }

    #[test]
    fn contiguous_run_becomes_a_segment() {
        let mut ftl = LearnedFtl::new();
        write_all(&mut ftl, &[5, 6, 7]);
        assert_eq!(ftl.read(5), 1000);
        assert_eq!(ftl.read(6), 1001);
        assert_eq!(ftl.read(7), 1002);
        assert_eq!(ftl.read(8), 0);
        let stats = ftl.stats();
        assert_eq!(stats.segments_learned, 1);
        assert_eq!(stats.crb_points, 0);
    }

    #[test]
    fn strided_run_becomes_a_segment() {
        let mut ftl = LearnedFtl::new();
        write_all(&mut ftl, &[10, 20, 30]);
        assert_eq!(ftl.read(10), 1000);
        assert_eq!(ftl.read(20), 1001);
        assert_eq!(ftl.read(30), 1002);
        // spanned but between stride points
        assert_eq!(ftl.read(15), 0);
    }

    #[test]
    fn sparse_pair_allocates_in_sorted_order() {
        let mut ftl = LearnedFtl::new();
        write_all(&mut ftl, &[100, 5]);
        assert_eq!(ftl.read(5), 1000);
        assert_eq!(ftl.read(100), 1001);
        assert_eq!(ftl.read(50), 0);
    }

    #[test]
    fn rewrite_within_one_flush_keeps_the_last() {
        let mut ftl = LearnedFtl::new();
        write_all(&mut ftl, &[5, 6, 7, 5]);
        // the duplicate collapses before stride analysis, so only three pages go out
        assert_eq!(ftl.read(5), 1000);
        assert_eq!(ftl.read(6), 1001);
        assert_eq!(ftl.read(7), 1002);
        write_all(&mut ftl, &[300]);
        assert_eq!(ftl.read(300), 1003);
    }

    #[test]
    fn read_of_unwritten_lba_is_unmapped() {
        let mut ftl = LearnedFtl::new();
        assert_eq!(ftl.read(42), 0);
    }

    #[test]
    fn full_buffer_flushes_as_one_segment() {
        let mut ftl = LearnedFtl::new();
        let lbas: Vec<Lba> = (0..WRITE_BUFFER_DEPTH as Lba).collect();
        write_all(&mut ftl, &lbas);
        for lba in 0..WRITE_BUFFER_DEPTH as Lba {
            assert_eq!(ftl.read(lba), 1000 + lba);
        }
        assert_eq!(ftl.stats().segments_learned, 1);
    }

    #[test]
    fn eager_flush_keeps_reads_coherent() {
        let mut ftl = LearnedFtl::new();
        write_all(&mut ftl, &[77]);
        assert_eq!(ftl.read(77), 1000);
        write_all(&mut ftl, &[77]);
        // second write must shadow the first across the flush boundary
        assert_eq!(ftl.read(77), 1001);
    }

    #[test]
    fn flush_on_empty_buffer_is_idempotent() {
        let mut ftl = LearnedFtl::new();
        ftl.flush();
        ftl.flush();
        assert_eq!(ftl.stats().flushes, 0);
        write_all(&mut ftl, &[1, 2]);
        ftl.flush();
        ftl.flush();
        assert_eq!(ftl.stats().flushes, 1);
    }

    #[test]
    fn out_of_range_lba_is_rejected() {
        let mut ftl = LearnedFtl::new();
        let beyond = (LBA_GROUPS * LBAS_PER_GROUP) as Lba;
        assert_eq!(ftl.write(beyond), Err(FtlError::InvalidLba(beyond)));
        assert_eq!(ftl.read(beyond), 0);
        // the top group is still mapped (offset 254: 255 is the separator case)
        assert!(ftl.write(beyond - 2).is_ok());
        assert_eq!(ftl.read(beyond - 2), 1000);
    }

    #[test]
    fn displaced_segment_still_serves_unrewritten_offsets() {
        let mut ftl = LearnedFtl::new();
        write_all(&mut ftl, &[0, 2, 4]);
        ftl.flush();
        write_all(&mut ftl, &[0, 1, 2]);
        ftl.flush();
        // the newer stride-1 segment wins where it maps...
        assert_eq!(ftl.read(0), 1003);
        assert_eq!(ftl.read(1), 1004);
        assert_eq!(ftl.read(2), 1005);
        // ...and the displaced stride-2 segment still serves offset 4
        assert_eq!(ftl.read(4), 1002);
    }

    #[test]
    fn crb_rewrite_returns_the_fresh_ppn() {
        let mut ftl = LearnedFtl::new();
        write_all(&mut ftl, &[10]);
        ftl.flush();
        write_all(&mut ftl, &[10]);
        ftl.flush();
        assert_eq!(ftl.read(10), 1001);
        assert_eq!(ftl.stats().crb_points, 2);
    }

    #[test]
    fn deep_overwrites_drop_the_oldest_segment() {
        let mut ftl = LearnedFtl::new();
        let rounds = (MAX_INSERT_DEPTH + 4) as u64;
        for round in 0..rounds {
            write_all(&mut ftl, &[0, 1]);
            ftl.flush();
            assert_eq!(ftl.read(0), 1000 + round * 2);
        }
        let stats = ftl.stats();
        assert_eq!(stats.segments_learned, rounds);
        assert_eq!(stats.segments_lost, 4);
    }

    #[test]
    fn separator_offset_point_is_dropped_but_allocates() {
        let mut ftl = LearnedFtl::new();
        // lba 255 alone in its group becomes a CRB point at offset 0xFF, which the
        // flat store cannot hold
        write_all(&mut ftl, &[255, 600]);
        ftl.flush();
        assert_eq!(ftl.read(255), 0);
        // allocation is positional: the dropped point still consumed ppn 1000
        assert_eq!(ftl.read(600), 1001);
        assert_eq!(ftl.stats().crb_points_dropped, 1);
    }

    #[test]
    fn writes_beyond_one_buffer_round_trip() {
        let mut ftl = LearnedFtl::new();
        // more writes than the buffer holds forces an in-line flush
        let lbas: Vec<Lba> = (0..400).map(|i| i * 3).collect();
        write_all(&mut ftl, &lbas);
        ftl.flush();
        for (i, &lba) in lbas.iter().enumerate() {
            assert_ne!(ftl.read(lba), 0, "lba {} lost (index {})", lba, i);
        }
    }

    /// The three representations share the staging and allocation discipline, so a
    /// trace that stays away from the two documented divergences (offset-255 CRB
    /// points, and segments lost past the depth bound) must produce the same
    /// outputs on all of them. The workload spreads over enough groups that a
    /// 16-deep displacement chain cannot realistically form.
    #[test]
    fn representations_agree_on_random_traces() {
        fn stage(engines: &mut (LearnedFtl, DirectFtl, DftlFtl), written: &mut Vec<Lba>, lba: Lba) {
            engines.0.write(lba).unwrap();
            engines.1.write(lba).unwrap();
            engines.2.write(lba).unwrap();
            written.push(lba);
        }
        let mut rng = rand::thread_rng();
        let mut written: Vec<Lba> = Vec::new();
        let mut engines = (LearnedFtl::new(), DirectFtl::new(), DftlFtl::new());
        for _ in 0..1500 {
            let roll = rng.gen_range(0..10);
            if written.is_empty() || roll < 4 {
                // a lone write, which flushes into a CRB point
                let mut lba: Lba = rng.gen_range(0..2_000_000);
                if lba % LBAS_PER_GROUP as Lba == 255 {
                    lba -= 1;
                }
                stage(&mut engines, &mut written, lba);
            } else if roll < 6 {
                // a sequential burst, which flushes into a segment
                let base: Lba = rng.gen_range(0..7000) * LBAS_PER_GROUP as Lba
                    + rng.gen_range(0..200);
                for delta in 0..4 {
                    stage(&mut engines, &mut written, base + delta);
                }
            } else {
                let lba = written[rng.gen_range(0..written.len())];
                let expected = engines.0.read(lba);
                assert_ne!(expected, 0, "written lba {} reads unmapped", lba);
                assert_eq!(engines.1.read(lba), expected, "direct diverged on lba {}", lba);
                assert_eq!(engines.2.read(lba), expected, "dftl diverged on lba {}", lba);
            }
        }
        engines.0.flush();
        engines.1.flush();
        engines.2.flush();
        for &lba in written.iter() {
            let expected = engines.0.read(lba);
            assert_eq!(engines.1.read(lba), expected, "direct diverged on lba {}", lba);
            assert_eq!(engines.2.read(lba), expected, "dftl diverged on lba {}", lba);
        }
        // the workload was built to dodge both loss paths; if this fires, the
        // comparison above was not actually exhaustive
        assert_eq!(engines.0.stats().segments_lost, 0);
        assert_eq!(engines.0.stats().crb_points_dropped, 0);
    }
}
