use crate::api::Ppn;

/// Separator byte between runs in the flat store. This doubles as the one offset
/// value (255) the CRB cannot represent; `insert` reports such offsets back to the
/// caller instead of corrupting the run structure with an ambiguous byte.
pub(crate) const RUN_SEPARATOR: u8 = 0xFF;

/// Conflict Record Buffer: the per-group spill store for write points that did not
/// fit a learned segment.
///
/// `data` is a flat array of LBA offsets partitioned into runs by `RUN_SEPARATOR`.
/// Within a run offsets are strictly ascending; across runs, the first offset of a
/// run is strictly greater than the last offset of its predecessor, so the runs
/// partition the offset axis. `run_ppns` holds one base PPN per run, in run order:
/// the offset at position `k` of a run resolves to `base + k`. Because the PPN of
/// an entry is positional, removing an offset from the middle of a run must split
/// the run rather than close the gap.
#[derive(Debug, Default)]
pub(crate) struct ConflictRecordBuffer {
    data: Vec<u8>,
    run_ppns: Vec<u32>,
}

impl ConflictRecordBuffer {
    /// Linear search of the flat store. O(n), deliberately: the occupancy bitmap
    /// filters out the reads that should not be here at all, and the store for any
    /// one group stays small in practice.
    pub fn search(&self, offset: u8) -> Ppn {
        let mut run = 0usize;
        let mut run_start = 0usize;
        for (i, &byte) in self.data.iter().enumerate() {
            if byte == RUN_SEPARATOR {
                run += 1;
                run_start = i + 1;
                continue;
            }
            if byte == offset {
                return self.run_ppns[run] as Ppn + (i - run_start) as Ppn;
            }
            // runs are sorted, so once we are past the target at a run boundary the
            // offset cannot appear further along
            if byte > offset && self.data.get(i + 1) == Some(&RUN_SEPARATOR) {
                break;
            }
        }
        0
    }

    /// Records a new run of offsets resolving to `base_ppn + position`. Offsets are
    /// sorted and deduplicated first; stale entries for the same offsets are removed
    /// so the partition invariant (and last-writer-wins) holds. Returns the number
    /// of offsets that could not be represented (the separator collision).
    ///
    /// The incoming run must not straddle the span of a surviving run, or the
    /// partition invariant breaks. The flush path only ever inserts fresh
    /// singletons, which cannot straddle anything.
    pub fn insert(&mut self, offsets: &[u8], base_ppn: u32) -> usize {
        let mut sorted: Vec<u8> = offsets.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let unrepresentable = sorted.iter().filter(|&&o| o == RUN_SEPARATOR).count();
        sorted.retain(|&o| o != RUN_SEPARATOR);
        if sorted.is_empty() {
            return unrepresentable;
        }

        for &offset in &sorted {
            self.remove_offset(offset);
        }

        // runs stay ordered by first offset; the new run goes in front of the first
        // run that starts past it
        let mut splice_at = self.data.len();
        let mut target_run = self.run_ppns.len();
        let mut run = 0usize;
        let mut at_run_head = true;
        for (i, &byte) in self.data.iter().enumerate() {
            if byte == RUN_SEPARATOR {
                run += 1;
                at_run_head = true;
                continue;
            }
            if at_run_head {
                if byte > sorted[0] {
                    splice_at = i;
                    target_run = run;
                    break;
                }
                at_run_head = false;
            }
        }

        if splice_at == self.data.len() {
            if !self.data.is_empty() {
                self.data.push(RUN_SEPARATOR);
            }
            self.data.extend_from_slice(&sorted);
        } else {
            let mut patch: Vec<u8> = Vec::with_capacity(sorted.len() + 1);
            patch.extend_from_slice(&sorted);
            patch.push(RUN_SEPARATOR);
            self.data.splice(splice_at..splice_at, patch);
        }
        self.run_ppns.insert(target_run, base_ppn);

        unrepresentable
    }

    /// Number of runs currently stored.
    #[allow(dead_code)] // this is only used by test code
    pub fn run_count(&self) -> usize { self.run_ppns.len() }

    /// Estimated heap footprint, for the benchmark gauge.
    pub fn footprint(&self) -> usize {
        self.data.len() + self.run_ppns.len() * core::mem::size_of::<u32>()
    }

    /// Drops `offset` from whichever run holds it, preserving the positional PPNs of
    /// every other entry. A middle-of-run removal splits the run in two: the right
    /// half gets a fresh base PPN pointing past the hole.
    fn remove_offset(&mut self, offset: u8) {
        let mut run = 0usize;
        let mut run_start = 0usize;
        let mut hit = None;
        for (i, &byte) in self.data.iter().enumerate() {
            if byte == RUN_SEPARATOR {
                run += 1;
                run_start = i + 1;
                continue;
            }
            if byte == offset {
                hit = Some((run, run_start, i));
                break;
            }
        }
        let (run, run_start, i) = match hit {
            Some(found) => found,
            None => return,
        };
        let run_end = self.data[i..]
            .iter()
            .position(|&byte| byte == RUN_SEPARATOR)
            .map(|p| i + p)
            .unwrap_or(self.data.len());

        if run_end - run_start == 1 {
            // last entry of its run: the run goes away along with one separator
            if run_end < self.data.len() {
                self.data.drain(run_start..=run_end);
            } else if run_start > 0 {
                self.data.drain(run_start - 1..run_end);
            } else {
                self.data.clear();
            }
            self.run_ppns.remove(run);
        } else if i == run_start {
            // head removal: shift the base PPN up instead of every position down
            self.data.remove(i);
            self.run_ppns[run] += 1;
        } else if i == run_end - 1 {
            self.data.remove(i);
        } else {
            // split: the removed byte becomes the separator between the halves
            self.data[i] = RUN_SEPARATOR;
            self.run_ppns.insert(run + 1, self.run_ppns[run] + (i - run_start) as u32 + 1);
        }
    }
}
