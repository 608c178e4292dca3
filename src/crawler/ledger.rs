//! Frontier / visited ledger
//!
//! The only state shared between discovery tasks. Every URL the session
//! learns about lives in exactly one of three sets:
//!
//! | Set | Meaning |
//! |-----|---------|
//! | scheduled | accepted into the frontier, fetch pending or in flight |
//! | visited | fetched successfully as HTML |
//! | dropped | fetch failed or the response was not HTML |
//!
//! The page budget bounds the total of all three, so `visited` can never
//! exceed it either.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

#[derive(Debug, Default)]
struct LedgerState {
    visited: HashSet<Url>,
    scheduled: HashSet<Url>,
    dropped: HashSet<Url>,
}

impl LedgerState {
    fn known(&self) -> usize {
        self.visited.len() + self.scheduled.len() + self.dropped.len()
    }

    fn contains(&self, url: &Url) -> bool {
        self.visited.contains(url) || self.scheduled.contains(url) || self.dropped.contains(url)
    }
}

/// Thread-safe set of normalized URLs seen during one discovery session
#[derive(Debug)]
pub struct Ledger {
    max_pages: usize,
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // The sets stay consistent even if a holder panicked mid-way
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `url` if it is new and the budget allows it
    ///
    /// The membership check, the budget check and the insertion happen under
    /// one lock, so exactly one caller ever gets `true` for a given URL and
    /// the budget is never overshot.
    pub fn try_enqueue(&self, url: &Url) -> bool {
        let mut state = self.lock();
        if state.contains(url) || state.known() >= self.max_pages {
            return false;
        }
        state.scheduled.insert(url.clone())
    }

    /// Moves a scheduled URL to `visited`
    pub fn mark_visited(&self, url: &Url) {
        let mut state = self.lock();
        state.scheduled.remove(url);
        state.dropped.remove(url);
        state.visited.insert(url.clone());
    }

    /// Moves a scheduled URL to `dropped`; it still counts against the budget
    pub fn mark_dropped(&self, url: &Url) {
        let mut state = self.lock();
        if state.scheduled.remove(url) {
            state.dropped.insert(url.clone());
        }
    }

    /// Number of visited URLs
    pub fn size(&self) -> usize {
        self.lock().visited.len()
    }

    /// Number of URLs in any state
    pub fn known(&self) -> usize {
        self.lock().known()
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// True once the visited set has reached the page budget
    pub fn is_full(&self) -> bool {
        self.size() >= self.max_pages
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.lock().visited.contains(url)
    }

    /// Visited URLs in lexicographic order
    pub fn visited_urls(&self) -> Vec<Url> {
        let mut urls: Vec<Url> = self.lock().visited.iter().cloned().collect();
        urls.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        urls
    }
}
