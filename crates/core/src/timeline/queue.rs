use std::collections::BTreeMap;

use crate::Result;

/// One-shot action run when its beat fires. It receives the context the
/// owning clock is ticked with.
pub type BeatCallback<T> = Box<dyn FnOnce(&mut T) -> Result<()>>;

/// Pending callbacks keyed by absolute beat index.
///
/// Callbacks for one beat keep their insertion order. A beat's entry is
/// removed as soon as it is drained, so nothing can fire twice.
pub struct BeatCallbackQueue<T> {
    pending: BTreeMap<i64, Vec<BeatCallback<T>>>,
}

impl<T> Default for BeatCallbackQueue<T> {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }
}

impl<T> BeatCallbackQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, beat: i64, callback: BeatCallback<T>) {
        self.pending.entry(beat).or_default().push(callback);
    }

    /// Removes and returns everything registered for `beat`.
    pub fn drain(&mut self, beat: i64) -> Vec<BeatCallback<T>> {
        self.pending.remove(&beat).unwrap_or_default()
    }

    pub fn len_at(&self, beat: i64) -> usize {
        self.pending.get(&beat).map_or(0, Vec::len)
    }

    pub fn contains(&self, beat: i64) -> bool {
        self.pending.contains_key(&beat)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// `(beat, callback count)` for every pending beat, ascending.
    pub fn pending(&self) -> impl Iterator<Item = (i64, usize)> + '_ {
        self.pending.iter().map(|(beat, list)| (*beat, list.len()))
    }
}

impl<T> std::fmt::Debug for BeatCallbackQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.pending()).finish()
    }
}
