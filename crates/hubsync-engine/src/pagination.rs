//! Termination guard for cursor-driven pagination loops.

use std::collections::HashSet;

use hubsync_shared::types::SyncDirection;

/// What a pagination loop should do after a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    Continue,
    /// The hub reported no further pages.
    Done,
    /// The returned cursor was already seen, or did not move.
    CycleDetected,
    /// The page budget is spent.
    PageLimit,
}

/// Tracks the cursors returned during one loop and stops it when the hub
/// repeats itself.
#[derive(Debug)]
pub struct CursorGuard {
    seen: HashSet<String>,
    pages: u32,
    max_pages: u32,
}

impl CursorGuard {
    pub fn new(max_pages: u32) -> Self {
        Self {
            seen: HashSet::new(),
            pages: 0,
            max_pages: max_pages.max(1),
        }
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Record one fetched page and decide whether to fetch another.
    ///
    /// `requested` is the cursor sent with the request, `returned` the one
    /// the hub handed back for the next request.
    pub fn advance(
        &mut self,
        requested: Option<&str>,
        direction: SyncDirection,
        returned: Option<&str>,
        has_more: bool,
    ) -> PageStep {
        self.pages += 1;

        let Some(returned) = returned else {
            return PageStep::Done;
        };
        if direction == SyncDirection::After && requested == Some(returned) {
            return PageStep::CycleDetected;
        }
        if !self.seen.insert(returned.to_string()) {
            return PageStep::CycleDetected;
        }
        if !has_more {
            return PageStep::Done;
        }
        if self.pages >= self.max_pages {
            return PageStep::PageLimit;
        }
        PageStep::Continue
    }
}
