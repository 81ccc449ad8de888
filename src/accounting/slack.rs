//! Slack arithmetic.

/// Calculate the unused tail bytes of an allocation.
///
/// With `n_blocks` allocated blocks the allocation is `n_blocks * block_size`;
/// with none, a single block is assumed. The result clamps at zero when the
/// logical size fills or exceeds the allocation.
pub fn calc_slack(block_size: u64, n_blocks: u64, size: u64) -> u64 {
    let allocated = if n_blocks != 0 {
        n_blocks.saturating_mul(block_size)
    } else {
        block_size
    };
    allocated.saturating_sub(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block() {
        assert_eq!(calc_slack(4096, 1, 100), 3996);
    }

    #[test]
    fn test_multiple_blocks() {
        assert_eq!(calc_slack(4096, 3, 9000), 3288);
    }

    #[test]
    fn test_no_blocks_falls_back_to_one_block() {
        assert_eq!(calc_slack(4096, 0, 100), 3996);
        assert_eq!(calc_slack(4096, 0, 5000), 0);
    }

    #[test]
    fn test_clamps_when_size_exceeds_allocation() {
        assert_eq!(calc_slack(1024, 2, 4096), 0);
        assert_eq!(calc_slack(4096, 2, 8192), 0);
    }

    #[test]
    fn test_formula_over_grid() {
        for &b in &[512u64, 1024, 4096, 65536] {
            for n in 0..5u64 {
                for &s in &[0u64, 1, 511, 4096, 9000, 70000] {
                    let slack = calc_slack(b, n, s);
                    let alloc = if n == 0 { b } else { n * b };
                    if alloc >= s {
                        assert_eq!(slack, alloc - s, "b={} n={} s={}", b, n, s);
                    } else {
                        assert_eq!(slack, 0, "b={} n={} s={}", b, n, s);
                    }
                }
            }
        }
    }

    #[test]
    fn test_huge_counts_do_not_overflow() {
        assert_eq!(calc_slack(u64::MAX, 2, 0), u64::MAX);
        assert_eq!(calc_slack(0, 0, 10), 0);
    }
}
