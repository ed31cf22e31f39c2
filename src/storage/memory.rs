use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    domain::track::{Track, TrackAttrs, TrackId},
    storage::{TrackStore, error::StoreError},
};

/// Keeps tracks in a vector guarded by a mutex.
///
/// A track with ID `n` lives at index `n - 1`. Deleted tracks leave a
/// `None` slot behind so that lookups stay index based and IDs are
/// never handed out twice.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tracks: Mutex<Vec<Option<Track>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single push or slot assignment, so the data is
    // consistent even if a holder of the lock panicked.
    fn tracks(&self) -> MutexGuard<'_, Vec<Option<Track>>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(id: TrackId) -> Option<usize> {
        usize::try_from(id.0).ok()?.checked_sub(1)
    }
}

impl TrackStore for MemoryStore {
    fn create(&self, attrs: TrackAttrs) -> Result<Track, StoreError> {
        let mut tracks = self.tracks();

        let id = i64::try_from(tracks.len() + 1)
            .map_err(|e| StoreError::Internal(anyhow::anyhow!("track ids exhausted: {e}")))?;
        let track = Track::new(TrackId(id), attrs);
        tracks.push(Some(track.clone()));

        Ok(track)
    }

    fn get(&self, id: TrackId) -> Result<Track, StoreError> {
        Self::index(id)
            .and_then(|i| self.tracks().get(i).cloned().flatten())
            .ok_or(StoreError::TrackNotFound(id))
    }

    fn list(&self) -> Result<Vec<Track>, StoreError> {
        Ok(self.tracks().iter().flatten().cloned().collect())
    }

    fn delete(&self, id: TrackId) -> Result<(), StoreError> {
        let mut tracks = self.tracks();

        Self::index(id)
            .and_then(|i| tracks.get_mut(i))
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(StoreError::TrackNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(title: &str) -> TrackAttrs {
        TrackAttrs {
            title: title.to_string(),
        }
    }

    #[test]
    fn test_create_assigns_increasing_ids() -> anyhow::Result<()> {
        let store = MemoryStore::new();

        let ids = (0..5)
            .map(|i| store.create(attrs(&format!("track {i}"))).map(|t| t.id))
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(ids.first(), Some(&TrackId(1)));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }

    #[test]
    fn test_get_returns_created_track() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let created = store.create(attrs("So What"))?;

        assert_eq!(store.get(created.id)?, created);
        Ok(())
    }

    #[test]
    fn test_get_unknown_ids() {
        let store = MemoryStore::new();

        for id in [0, -1, 1, i64::MAX] {
            assert!(matches!(
                store.get(TrackId(id)),
                Err(StoreError::TrackNotFound(_))
            ));
        }
    }

    #[test]
    fn test_list_empty() -> anyhow::Result<()> {
        assert!(MemoryStore::new().list()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_never_reuses_ids() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let first = store.create(attrs("a"))?;
        let second = store.create(attrs("b"))?;

        store.delete(second.id)?;
        let third = store.create(attrs("c"))?;

        assert!(third.id > second.id);
        assert!(matches!(
            store.get(second.id),
            Err(StoreError::TrackNotFound(_))
        ));
        assert_eq!(store.list()?, vec![first, third]);
        Ok(())
    }

    #[test]
    fn test_delete_twice_is_not_found() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let track = store.create(attrs("a"))?;

        store.delete(track.id)?;

        assert!(matches!(
            store.delete(track.id),
            Err(StoreError::TrackNotFound(_))
        ));
        Ok(())
    }
}
