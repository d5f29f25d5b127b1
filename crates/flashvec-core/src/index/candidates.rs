//! Bounded sorted candidate list (the search "best-list").
//!
//! Entries are kept ascending by `(distance, id)` with duplicate ids
//! suppressed. The list is bounded to the search width L; insertions beyond
//! the bound evict the current worst entry. Updating an entry from its PQ
//! estimate to the exact distance re-sorts it while preserving its expanded
//! bit.

/// One best-list entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Point id.
    pub id: u32,
    /// Approximate (PQ) or exact distance, whichever was set last.
    pub distance: f32,
    /// Whether this entry has already been drawn into a frontier.
    pub expanded: bool,
}

/// Size-bounded sorted candidate list.
#[derive(Debug)]
pub struct CandidateList {
    entries: Vec<Candidate>,
    capacity: usize,
}

impl CandidateList {
    /// Creates an empty list bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Clears the list and applies a new bound.
    pub fn reset(&mut self, capacity: usize) {
        self.entries.clear();
        if self.entries.capacity() < capacity + 1 {
            self.entries.reserve(capacity + 1 - self.entries.capacity());
        }
        self.capacity = capacity;
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sort_position(&self, distance: f32, id: u32) -> usize {
        self.entries
            .partition_point(|c| match c.distance.total_cmp(&distance) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => c.id < id,
                std::cmp::Ordering::Greater => false,
            })
    }

    /// Inserts a candidate with its approximate distance.
    ///
    /// Returns false when the id is already present or the entry does not
    /// fit within the bound.
    pub fn insert(&mut self, id: u32, distance: f32) -> bool {
        if self.entries.iter().any(|c| c.id == id) {
            return false;
        }
        let pos = self.sort_position(distance, id);
        if pos >= self.capacity {
            return false;
        }
        self.entries.insert(
            pos,
            Candidate {
                id,
                distance,
                expanded: false,
            },
        );
        self.entries.truncate(self.capacity);
        true
    }

    /// Replaces an entry's distance with its exact value, re-sorting while
    /// preserving the expanded bit. Ids not present are ignored.
    pub fn update_exact(&mut self, id: u32, distance: f32) {
        let Some(at) = self.entries.iter().position(|c| c.id == id) else {
            return;
        };
        let expanded = self.entries[at].expanded;
        self.entries.remove(at);
        let pos = self.sort_position(distance, id);
        self.entries.insert(
            pos,
            Candidate {
                id,
                distance,
                expanded,
            },
        );
    }

    /// Draws the closest unexpanded entry, marking it expanded.
    pub fn pop_closest_unexpanded(&mut self) -> Option<Candidate> {
        let slot = self.entries.iter_mut().find(|c| !c.expanded)?;
        slot.expanded = true;
        Some(*slot)
    }

    /// True while some entry has not been drawn yet.
    #[must_use]
    pub fn has_unexpanded(&self) -> bool {
        self.entries.iter().any(|c| !c.expanded)
    }

    /// Entries in ascending `(distance, id)` order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.iter()
    }
}
