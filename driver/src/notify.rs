//! Operator notification (spec section 4.9): five consecutive pair-level
//! failures reset the counter and flag the operator.
//!
//! The original implementation shells out to `mailx` via `os.system` with
//! interpolated strings, which is not a pattern worth carrying forward.
//! This just logs at `error` level; wiring a paging integration on top of
//! that is left to whoever deploys this.

use ting_types::RelayPair;

pub fn consecutive_pair_failures(count: u32, last_pair: &RelayPair) {
    log::error!(
        "{count} consecutive pair failures, most recently {}->{}",
        last_pair.0,
        last_pair.1
    );
}
