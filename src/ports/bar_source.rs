//! Dataset access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::TickfeedError;

/// Pull-based cursor over an ordered dataset of bars. One cursor per
/// session, read in file order; `Ok(None)` signals end-of-data.
///
/// Implementations absorb malformed rows (skip with a warning) and only
/// error on conditions fatal to the whole session, such as an unreadable
/// file.
pub trait BarSource {
    fn next_bar(&mut self) -> Result<Option<Bar>, TickfeedError>;
}

impl BarSource for Vec<Bar> {
    /// In-memory source for tests and replays; drains from the front.
    fn next_bar(&mut self) -> Result<Option<Bar>, TickfeedError> {
        if self.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.remove(0)))
        }
    }
}
