use crate::api::{FtlError, Lba, LBAS_PER_GROUP, WRITE_BUFFER_DEPTH};

/// Fixed-depth staging queue for writes. Contents are unordered as enqueued; the
/// flush path drains them as one sorted, deduplicated batch so that stride
/// detection sees each group's offsets in ascending order.
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    staged: Vec<Lba>,
}

impl WriteBuffer {
    pub fn new() -> Self { WriteBuffer { staged: Vec::with_capacity(WRITE_BUFFER_DEPTH) } }

    pub fn is_full(&self) -> bool { self.staged.len() >= WRITE_BUFFER_DEPTH }

    pub fn is_empty(&self) -> bool { self.staged.is_empty() }

    pub fn push(&mut self, lba: Lba) -> Result<(), FtlError> {
        if self.is_full() {
            return Err(FtlError::BufferFull);
        }
        self.staged.push(lba);
        Ok(())
    }

    /// Linear scan for the read-collision check. The buffer never exceeds 256
    /// entries, so nothing smarter pays for itself.
    pub fn contains(&self, lba: Lba) -> bool { self.staged.iter().any(|&staged| staged == lba) }

    /// Empties the stage into a sorted batch. Duplicate LBAs keep only the *last*
    /// enqueued occurrence: two writes to the same LBA between flushes resolve to
    /// the later one, and a stride-0 "run" must never reach the learner.
    pub fn drain_sorted(&mut self) -> Vec<Lba> {
        let mut batch: Vec<Lba> = Vec::with_capacity(self.staged.len());
        for &lba in self.staged.iter().rev() {
            if !batch.contains(&lba) {
                batch.push(lba);
            }
        }
        self.staged.clear();
        batch.sort_unstable();
        batch
    }
}

/// One allocation unit extracted from a sorted flush batch. PPN consumption is
/// positional: a strided run consumes one page per mapped point, a point consumes
/// exactly one.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Run {
    /// two or more LBAs in `group` with a constant stride
    Strided { group: u32, start: u8, length: u8, step: u8, pages: u32 },
    /// a lone LBA in its group
    Point { group: u32, offset: u8 },
}

/// Walks a sorted, deduplicated batch and carves it into per-group runs of equal
/// stride. Within one group any two adjacent LBAs are at most 255 apart, so the
/// stride always fits the segment encoding.
pub(crate) fn extract_runs(batch: &[Lba]) -> Vec<Run> {
    let group_of = |lba: Lba| (lba / LBAS_PER_GROUP as Lba) as u32;
    let offset_of = |lba: Lba| (lba % LBAS_PER_GROUP as Lba) as u8;

    let mut runs = Vec::new();
    let mut i = 0usize;
    while i < batch.len() {
        let group = group_of(batch[i]);
        let mut group_end = i;
        while group_end + 1 < batch.len() && group_of(batch[group_end + 1]) == group {
            group_end += 1;
        }

        let mut k = i;
        while k <= group_end {
            if k == group_end {
                runs.push(Run::Point { group, offset: offset_of(batch[k]) });
                k += 1;
                continue;
            }
            // the first gap fixes the stride; extend while it repeats
            let stride = batch[k + 1] - batch[k];
            let mut end = k + 1;
            while end + 1 <= group_end && batch[end + 1] - batch[end] == stride {
                end += 1;
            }
            runs.push(Run::Strided {
                group,
                start: offset_of(batch[k]),
                length: offset_of(batch[end]) - offset_of(batch[k]),
                step: stride as u8,
                pages: (end - k + 1) as u32,
            });
            k = end + 1;
        }

        i = group_end + 1;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_sorts_ascending() {
        let mut buf = WriteBuffer::new();
        for &lba in &[30u64, 10, 20] {
            buf.push(lba).unwrap();
        }
        assert_eq!(buf.drain_sorted(), vec![10, 20, 30]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_keeps_last_duplicate() {
        let mut buf = WriteBuffer::new();
        for &lba in &[5u64, 6, 7, 5] {
            buf.push(lba).unwrap();
        }
        // one entry per LBA survives; the batch is position-free after sorting, so
        // "keeping the last" matters only in that exactly one survives
        assert_eq!(buf.drain_sorted(), vec![5, 6, 7]);
    }

    #[test]
    fn refuses_past_capacity() {
        let mut buf = WriteBuffer::new();
        for lba in 0..WRITE_BUFFER_DEPTH as u64 {
            buf.push(lba).unwrap();
        }
        assert!(buf.is_full());
        assert_eq!(buf.push(999), Err(FtlError::BufferFull));
    }

    #[test]
    fn contiguous_batch_is_one_run() {
        let runs = extract_runs(&[5, 6, 7]);
        assert_eq!(runs, vec![Run::Strided { group: 0, start: 5, length: 2, step: 1, pages: 3 }]);
    }

    #[test]
    fn strided_batch_is_one_run() {
        let runs = extract_runs(&[10, 20, 30]);
        assert_eq!(runs, vec![Run::Strided { group: 0, start: 10, length: 20, step: 10, pages: 3 }]);
    }

    #[test]
    fn stride_break_starts_a_new_run() {
        let runs = extract_runs(&[0, 1, 2, 10, 20, 30]);
        assert_eq!(runs, vec![
            Run::Strided { group: 0, start: 0, length: 2, step: 1, pages: 3 },
            Run::Strided { group: 0, start: 10, length: 20, step: 10, pages: 3 },
        ]);
    }

    #[test]
    fn trailing_singleton_is_a_point() {
        let runs = extract_runs(&[0, 1, 2, 9]);
        assert_eq!(runs, vec![
            Run::Strided { group: 0, start: 0, length: 2, step: 1, pages: 3 },
            Run::Point { group: 0, offset: 9 },
        ]);
    }

    #[test]
    fn groups_split_runs() {
        // 255 and 256 are adjacent LBAs but belong to different groups
        let runs = extract_runs(&[254, 255, 256, 257]);
        assert_eq!(runs, vec![
            Run::Strided { group: 0, start: 254, length: 1, step: 1, pages: 2 },
            Run::Strided { group: 1, start: 0, length: 1, step: 1, pages: 2 },
        ]);
    }

    #[test]
    fn lone_lba_in_group_is_a_point() {
        let runs = extract_runs(&[42]);
        assert_eq!(runs, vec![Run::Point { group: 0, offset: 42 }]);
    }
}
