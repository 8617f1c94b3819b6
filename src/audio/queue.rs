use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::PlayerError, sources::TrackRef};

/// Pending tracks for one guild. The head is the track playing or about to play.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<TrackRef>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track a la cola
    pub fn add_track(&mut self, item: TrackRef) -> Result<(), PlayerError> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", item.label());
        self.items.push_back(item);

        Ok(())
    }

    /// Agrega múltiples tracks (playlist), hasta llenar la cola.
    /// Retorna cuántos se agregaron.
    pub fn add_playlist(&mut self, items: impl IntoIterator<Item = TrackRef>) -> usize {
        let available_space = self.max_size.saturating_sub(self.items.len());
        let before = self.items.len();

        self.items.extend(items.into_iter().take(available_space));

        let added = self.items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    pub fn head(&self) -> Option<&TrackRef> {
        self.items.front()
    }

    /// Replaces the head once its lazy resolution finished.
    pub fn replace_head(&mut self, item: TrackRef) {
        if let Some(head) = self.items.front_mut() {
            *head = item;
        }
    }

    pub fn pop_head(&mut self) -> Option<TrackRef> {
        let popped = self.items.pop_front();
        if let Some(item) = &popped {
            debug!("➡️ Sale de la cola: {}", item.label());
        }
        popped
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRef> {
        self.items.iter()
    }
}
