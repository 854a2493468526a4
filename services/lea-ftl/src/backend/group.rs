use crate::api::Ppn;
use crate::backend::{ConflictRecordBuffer, InsertOutcome, OccupancyBitmap, Segment, SegmentLevels};

/// All mapping state for one 256-LBA group: the segment levels, the CRB spill
/// store, and the bitmap that arbitrates between them on reads.
///
/// The bitmap records which store *last* took authority over each offset. Only a
/// freshly learned segment or a fresh CRB point may flip a bit; a displaced segment
/// re-landing on a lower level must not, because the offsets it spans may since
/// have been rewritten into the CRB.
#[derive(Debug, Default)]
pub(crate) struct GroupTable {
    levels: SegmentLevels,
    crb: ConflictRecordBuffer,
    bitmap: OccupancyBitmap,
}

impl GroupTable {
    /// A freshly learned segment takes authority over every offset it maps
    /// (stride-aware), then enters the displacement loop.
    pub fn learn_segment(&mut self, seg: Segment) -> InsertOutcome {
        for offset in seg.points() {
            self.bitmap.set(offset, true);
        }
        self.levels.insert(seg)
    }

    /// A fresh CRB point takes authority over its offset. Returns the number of
    /// offsets the CRB could not represent (the separator collision); authority is
    /// surrendered either way, so reads of a dropped point miss rather than
    /// resolving through a stale segment.
    pub fn learn_point(&mut self, offset: u8, ppn: u32) -> usize {
        self.bitmap.set(offset, false);
        self.crb.insert(&[offset], ppn)
    }

    /// The per-group read path: one bitmap probe picks the store to search.
    pub fn lookup(&self, offset: u8) -> Ppn {
        if self.bitmap.in_segment(offset) {
            self.levels.search(offset)
        } else {
            self.crb.search(offset)
        }
    }

    /// Estimated heap footprint of the dynamic state, for the benchmark gauge.
    pub fn footprint(&self) -> usize { self.levels.footprint() + self.crb.footprint() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_dispatches_between_stores() {
        let mut group = GroupTable::default();
        group.learn_segment(Segment { start: 10, length: 2, step: 1, base_ppn: 1000 });
        assert_eq!(group.learn_point(50, 2000), 0);
        assert_eq!(group.lookup(11), 1001);
        assert_eq!(group.lookup(50), 2000);
        assert_eq!(group.lookup(60), 0);
    }

    #[test]
    fn crb_point_overrides_segment_offset() {
        let mut group = GroupTable::default();
        group.learn_segment(Segment { start: 0, length: 4, step: 1, base_ppn: 1000 });
        group.learn_point(2, 5000);
        // offset 2 moved to the CRB; its neighbours still resolve via the segment
        assert_eq!(group.lookup(2), 5000);
        assert_eq!(group.lookup(1), 1001);
        assert_eq!(group.lookup(3), 1003);
    }

    #[test]
    fn new_segment_reclaims_crb_offset() {
        let mut group = GroupTable::default();
        group.learn_point(7, 2000);
        group.learn_segment(Segment { start: 5, length: 4, step: 1, base_ppn: 3000 });
        assert_eq!(group.lookup(7), 3002);
    }

    #[test]
    fn displaced_segment_does_not_steal_authority() {
        let mut group = GroupTable::default();
        // stride-2 segment maps 0,2,4
        group.learn_segment(Segment { start: 0, length: 4, step: 2, base_ppn: 1000 });
        // offset 2 is rewritten as a CRB point
        group.learn_point(2, 2000);
        // a new segment spanning 4..6 displaces nothing interesting for offset 2,
        // but does displace the stride-2 resident down a level
        group.learn_segment(Segment { start: 4, length: 2, step: 1, base_ppn: 3000 });
        // offset 2's latest writer is still the CRB point
        assert_eq!(group.lookup(2), 2000);
        assert_eq!(group.lookup(0), 1000);
        assert_eq!(group.lookup(4), 3000);
        assert_eq!(group.lookup(5), 3001);
    }
}
