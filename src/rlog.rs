// SPDX-License-Identifier: Apache-2.0

//! A growable, segment-backed append log.
//!
//! The read-set list and the gcroots (write-set) list are private to one
//! descriptor and are cleared and refilled every transaction attempt. Rather
//! than reallocating a fresh `Vec` on every retry, entries are stored in
//! fixed-size segments so a `clear()` is just an index reset, and the
//! segment storage is reused across transactions.

const SEGMENT_SIZE: usize = 32;

struct Segment<T> {
    items: [Option<T>; SEGMENT_SIZE],
    len: usize,
}

impl<T> Default for Segment<T> {
    fn default() -> Self {
        Segment {
            items: std::array::from_fn(|_| None),
            len: 0,
        }
    }
}

impl<T> Segment<T> {
    /// Appends `value`, returning it back on `Err` if the segment is full.
    fn push(&mut self, value: T) -> Result<(), T> {
        if self.len == SEGMENT_SIZE {
            return Err(value);
        }
        self.items[self.len] = Some(value);
        self.len += 1;
        Ok(())
    }

    fn clear(&mut self) {
        for slot in self.items.iter_mut().take(self.len) {
            *slot = None;
        }
        self.len = 0;
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.items[..self.len].iter().map(|s| s.as_ref().unwrap())
    }
}

/// An append-only log of `T`, segmented in chunks of [`SEGMENT_SIZE`].
pub struct AppendLog<T> {
    segments: Vec<Segment<T>>,
}

impl<T> Default for AppendLog<T> {
    fn default() -> Self {
        AppendLog { segments: Vec::new() }
    }
}

impl<T> AppendLog<T> {
    pub fn push(&mut self, value: T) {
        let value = match self.segments.last_mut() {
            Some(last) => match last.push(value) {
                Ok(()) => return,
                Err(value) => value,
            },
            None => value,
        };
        let mut seg = Segment::default();
        seg.push(value).ok().expect("fresh segment always has room");
        self.segments.push(seg);
    }

    pub fn clear(&mut self) {
        for seg in &mut self.segments {
            seg.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.segments.iter().flat_map(|s| s.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_iterate_across_segments() {
        let mut log: AppendLog<usize> = AppendLog::default();
        for i in 0..100 {
            log.push(i);
        }
        assert_eq!(log.len(), 100);
        let collected: Vec<usize> = log.iter().copied().collect();
        assert_eq!(collected, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn clear_resets_length() {
        let mut log: AppendLog<usize> = AppendLog::default();
        log.push(1);
        log.push(2);
        log.clear();
        assert!(log.is_empty());
        log.push(3);
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec![3]);
    }
}
