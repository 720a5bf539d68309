// src/clip/playlist.rs

use super::{Clip, ClipId};

/// Ordered songs of one mode. Order is concatenation order and persisted order.
#[derive(Default)]
pub struct Playlist {
    clips: Vec<Clip>,
    next_id: u64,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh id; the intro slot draws from the same counter.
    pub fn allocate_id(&mut self) -> ClipId {
        self.next_id += 1;
        ClipId(self.next_id)
    }

    pub fn push(&mut self, clip: Clip) {
        if clip.id.0 > self.next_id {
            self.next_id = clip.id.0;
        }
        self.clips.push(clip);
    }

    pub fn remove(&mut self, id: ClipId) -> Option<Clip> {
        let idx = self.index_of(id)?;
        Some(self.clips.remove(idx))
    }

    pub fn index_of(&self, id: ClipId) -> Option<usize> {
        self.clips.iter().position(|c| c.id == id)
    }

    /// Moves one clip to `to_index` (clamped to the end). Returns false for unknown ids.
    pub fn move_clip(&mut self, id: ClipId, to_index: usize) -> bool {
        let Some(from) = self.index_of(id) else {
            return false;
        };
        let clip = self.clips.remove(from);
        let to = to_index.min(self.clips.len());
        self.clips.insert(to, clip);
        true
    }

    /// Applies a complete new order (drag-reorder result). Anything that is not a
    /// permutation of the current ids is rejected and leaves the order untouched.
    pub fn reorder(&mut self, order: &[ClipId]) -> bool {
        if order.len() != self.clips.len() {
            return false;
        }
        let mut positions = Vec::with_capacity(order.len());
        for id in order {
            match self.index_of(*id) {
                Some(idx) if !positions.contains(&idx) => positions.push(idx),
                _ => return false,
            }
        }
        let mut slots: Vec<Option<Clip>> = self.clips.drain(..).map(Some).collect();
        self.clips = positions
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect();
        true
    }

    pub fn get(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    pub fn ids(&self) -> Vec<ClipId> {
        self.clips.iter().map(|c| c.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Clip> {
        self.clips.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clear(&mut self) {
        self.clips.clear();
    }
}

/// Single optional intro clip, held outside the playlist.
#[derive(Default)]
pub struct IntroSlot {
    clip: Option<Clip>,
}

impl IntroSlot {
    /// Installs `clip`, returning the one it replaced.
    pub fn replace(&mut self, clip: Clip) -> Option<Clip> {
        self.clip.replace(clip)
    }

    pub fn clear(&mut self) -> Option<Clip> {
        self.clip.take()
    }

    pub fn get(&self) -> Option<&Clip> {
        self.clip.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Clip> {
        self.clip.as_mut()
    }

    pub fn is_present(&self) -> bool {
        self.clip.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::test_support::wav_bytes;

    fn playlist_of(n: usize) -> Playlist {
        let mut p = Playlist::new();
        for i in 0..n {
            let id = p.allocate_id();
            let clip = Clip::load(
                id,
                format!("song{i}.wav"),
                "audio/wav".into(),
                wav_bytes(1.0, 4_000, 1, 0.1),
                4_000,
            )
            .unwrap();
            p.push(clip);
        }
        p
    }

    #[test]
    fn reorder_applies_permutation() {
        let mut p = playlist_of(3);
        let ids = p.ids();
        assert!(p.reorder(&[ids[2], ids[0], ids[1]]));
        assert_eq!(p.ids(), vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn reorder_rejects_duplicates_and_unknown_ids() {
        let mut p = playlist_of(3);
        let ids = p.ids();
        assert!(!p.reorder(&[ids[0], ids[0], ids[1]]));
        assert!(!p.reorder(&[ids[0], ids[1], ClipId(99)]));
        assert!(!p.reorder(&[ids[0]]));
        assert_eq!(p.ids(), ids);
    }

    #[test]
    fn move_and_remove_keep_ids_stable() {
        let mut p = playlist_of(3);
        let ids = p.ids();
        assert!(p.move_clip(ids[0], 10));
        assert_eq!(p.ids(), vec![ids[1], ids[2], ids[0]]);
        let removed = p.remove(ids[2]).unwrap();
        assert_eq!(removed.id, ids[2]);
        assert_eq!(p.ids(), vec![ids[1], ids[0]]);
        assert_ne!(p.allocate_id(), ids[2]);
    }
}
