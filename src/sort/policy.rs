//! Run-stack balancing strategies behind [`MergePolicy`](super::MergePolicy).
//!
//! A strategy decides how runs are cut from the input and which adjacent
//! pending runs to merge after every push. The inequality directions below
//! are load-bearing: they determine the merge decisions and with them the
//! worst-case comparison count, so each heuristic is kept branch for branch.

use {
    super::{find_run, NodeCmp, Run, RunStack},
    crate::head::ListHead,
    core::ptr,
};

/// Number of bits needed to represent `n`; zero for zero. Stands in for
/// `floor(log2(n)) + 1` in the balance heuristics.
pub(crate) fn bit_length(n: usize) -> u32 {
    usize::BITS - n.leading_zeros()
}

/// One run-stack balancing policy: how to extract the next run, when to
/// merge pending runs, and how to collapse the stack at end of input.
pub(crate) trait Strategy {
    /// Cuts the next run off the front of `list`; returns the run and the
    /// first unconsumed node (null when the input is exhausted).
    ///
    /// # Safety
    /// `list` must be the valid, non-null head of a null-terminated chain.
    unsafe fn extract_run<F: NodeCmp>(&mut self, cmp: &mut F, list: *mut ListHead)
        -> (Run, *mut ListHead);

    /// Restores the policy's balance invariant after a push.
    ///
    /// # Safety
    /// All stacked runs must hold valid null-terminated chains.
    unsafe fn collapse<F: NodeCmp>(&mut self, cmp: &mut F, stack: &mut RunStack);

    /// Merges down to at most two runs at end of input, ignoring balance.
    ///
    /// # Safety
    /// All stacked runs must hold valid null-terminated chains.
    unsafe fn force_collapse<F: NodeCmp>(&mut self, cmp: &mut F, stack: &mut RunStack) {
        while stack.len() >= 3 {
            let d = stack.len();
            stack.merge_at(d - 2, cmp);
        }
    }
}

/// Binary-counter balancing: every extracted node is a run of length one,
/// and the merges after each push mirror the carries of incrementing
/// `count`, one merge per trailing set bit. Pending runs are therefore
/// power-of-two sized (except possibly the newest) and merged smallest
/// first, which bounds the worst case and keeps merges cache-friendly.
#[derive(Default)]
pub(crate) struct BottomUp {
    /// Runs extracted so far.
    count: usize,
}

impl Strategy for BottomUp {
    unsafe fn extract_run<F: NodeCmp>(
        &mut self,
        _cmp: &mut F,
        list: *mut ListHead,
    ) -> (Run, *mut ListHead) {
        let rest = (*list).next;
        (*list).next = ptr::null_mut();
        (Run { head: list, len: 1 }, rest)
    }

    unsafe fn collapse<F: NodeCmp>(&mut self, cmp: &mut F, stack: &mut RunStack) {
        let mut bits = self.count;
        while bits & 1 == 1 {
            let d = stack.len();
            stack.merge_at(d - 2, cmp);
            bits >>= 1;
        }
        self.count += 1;
    }
}

/// Natural-run balancing with the Shivers invariant: once the run three
/// entries down no longer out-bit-lengths the two runs above it combined,
/// those two lower entries are merged. This keeps every run roughly at most
/// half the size of the run below it, which bounds total merge cost to
/// O(n log n) even for adversarial run-length sequences.
pub(crate) struct Shivers;

impl Strategy for Shivers {
    unsafe fn extract_run<F: NodeCmp>(
        &mut self,
        cmp: &mut F,
        list: *mut ListHead,
    ) -> (Run, *mut ListHead) {
        find_run(cmp, list)
    }

    unsafe fn collapse<F: NodeCmp>(&mut self, cmp: &mut F, stack: &mut RunStack) {
        while stack.len() >= 3 {
            let d = stack.len();
            let top = stack.run(d - 1).len;
            let second = stack.run(d - 2).len;
            let third = stack.run(d - 3).len;
            if bit_length(third) > bit_length(second | top) {
                break;
            }
            stack.merge_at(d - 3, cmp);
        }
    }
}

/// Refined natural-run balancing: examines up to the top four pending runs
/// and picks which adjacent pair to merge, trading bookkeeping on run
/// lengths for fewer element comparisons on partially sorted inputs. The
/// force-collapse is weighted as well, merging whichever adjacent pair is
/// cheaper.
pub(crate) struct ShiversRefined;

impl Strategy for ShiversRefined {
    unsafe fn extract_run<F: NodeCmp>(
        &mut self,
        cmp: &mut F,
        list: *mut ListHead,
    ) -> (Run, *mut ListHead) {
        find_run(cmp, list)
    }

    unsafe fn collapse<F: NodeCmp>(&mut self, cmp: &mut F, stack: &mut RunStack) {
        loop {
            let n = stack.len();
            if n < 3 {
                break;
            }
            let top = stack.run(n - 1).len;
            let second = stack.run(n - 2).len;
            let third = stack.run(n - 3).len;

            if bit_length(top) > bit_length(second) && top < third {
                stack.merge_at(n - 2, cmp);
            } else if bit_length(top) > bit_length(third)
                || bit_length(top) > bit_length(second)
                || (n > 3 && bit_length(second) >= bit_length(third))
            {
                let bottom = stack.run(0).len;
                if n == 4
                    && (bit_length(second) >= bit_length(bottom)
                        || bit_length(third) > bit_length(bottom))
                {
                    stack.merge_at(0, cmp);
                } else {
                    stack.merge_at(n - 3, cmp);
                }
            } else {
                break;
            }
        }
    }

    unsafe fn force_collapse<F: NodeCmp>(&mut self, cmp: &mut F, stack: &mut RunStack) {
        while stack.len() >= 3 {
            let n = stack.len();
            if stack.run(n - 3).len < stack.run(n - 1).len {
                stack.merge_at(n - 3, cmp);
            } else {
                stack.merge_at(n - 2, cmp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::bit_length;

    #[test]
    fn bit_length_matches_floor_log2() {
        assert_eq!(bit_length(0), 0);
        assert_eq!(bit_length(1), 1);
        assert_eq!(bit_length(2), 2);
        assert_eq!(bit_length(3), 2);
        assert_eq!(bit_length(4), 3);
        assert_eq!(bit_length(255), 8);
        assert_eq!(bit_length(256), 9);
        assert_eq!(bit_length(usize::MAX), usize::BITS);
    }
}
