use crate::models::Station;
use crate::storage::{Storage, StorageKey};
use anyhow::Result;

/// The user's favorites and dislikes, both in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    pub favorites: Vec<Station>,
    pub disliked: Vec<Station>,
}

impl Library {
    pub fn load(storage: &Storage) -> Result<Self> {
        Ok(Self {
            favorites: storage.load(StorageKey::Favorites)?.unwrap_or_default(),
            disliked: storage.load(StorageKey::DislikedStations)?.unwrap_or_default(),
        })
    }

    pub fn save(&self, storage: &Storage) -> Result<()> {
        storage.save(StorageKey::Favorites, &self.favorites)?;
        storage.save(StorageKey::DislikedStations, &self.disliked)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.iter().any(|s| s.stationuuid == id)
    }

    pub fn is_disliked(&self, id: &str) -> bool {
        self.disliked.iter().any(|s| s.stationuuid == id)
    }

    /// Returns false when the station already was a favorite.
    pub fn like(&mut self, station: &Station) -> bool {
        if self.is_favorite(&station.stationuuid) {
            return false;
        }
        self.favorites.push(station.clone());
        true
    }

    pub fn delete_favorite(&mut self, id: &str) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|s| s.stationuuid != id);
        self.favorites.len() != before
    }

    /// Returns whether the station is disliked afterwards.
    pub fn toggle_dislike(&mut self, station: &Station) -> bool {
        if let Some(idx) = self
            .disliked
            .iter()
            .position(|s| s.stationuuid == station.stationuuid)
        {
            self.disliked.remove(idx);
            false
        } else {
            self.disliked.push(station.clone());
            true
        }
    }
}
