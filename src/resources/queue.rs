//! Background loads handed back to the render thread.
//!
//! Every request bumps the generation of its slot. A finished load is only
//! delivered if its generation is still the newest for that slot, so a slow
//! old request can never replace the result of a newer one.

use std::{collections::HashMap, future::Future};

use log::{debug, info};
use tokio::sync::mpsc;

use crate::resources::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadSlot {
    Model,
    Environment,
}

#[derive(Debug)]
pub struct Finished<T> {
    pub slot: LoadSlot,
    pub generation: u64,
    pub result: Result<T, LoadError>,
}

pub struct LoadQueue<T> {
    latest: HashMap<LoadSlot, u64>,
    tx: mpsc::UnboundedSender<Finished<T>>,
    rx: mpsc::UnboundedReceiver<Finished<T>>,
}

impl<T: Send + 'static> LoadQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            latest: HashMap::new(),
            tx,
            rx,
        }
    }

    /// Start `load` on `runtime` and return the generation it was issued as.
    pub fn request<F>(&mut self, runtime: &tokio::runtime::Handle, slot: LoadSlot, load: F) -> u64
    where
        F: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        let generation = self.latest.get(&slot).copied().unwrap_or(0) + 1;
        self.latest.insert(slot, generation);
        debug!("Requested {:?} load, generation {}", slot, generation);

        let tx = self.tx.clone();
        let task = runtime.spawn(load);
        runtime.spawn(async move {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(LoadError::Join(e)),
            };
            if tx.send(Finished { slot, generation, result }).is_err() {
                debug!("{:?} load finished after the queue was dropped", slot);
            }
        });
        generation
    }

    pub fn latest(&self, slot: LoadSlot) -> Option<u64> {
        self.latest.get(&slot).copied()
    }

    pub fn accept(&self, slot: LoadSlot, generation: u64) -> bool {
        self.latest(slot) == Some(generation)
    }

    fn admit(&self, finished: Finished<T>) -> Option<Finished<T>> {
        if self.accept(finished.slot, finished.generation) {
            Some(finished)
        } else {
            info!(
                "Discarding stale {:?} load (generation {}, latest {:?})",
                finished.slot,
                finished.generation,
                self.latest(finished.slot)
            );
            None
        }
    }

    /// Everything that finished since the last call, without blocking.
    /// Stale results are dropped here.
    pub fn drain(&mut self) -> Vec<Finished<T>> {
        let mut ready = Vec::new();
        while let Ok(finished) = self.rx.try_recv() {
            if let Some(finished) = self.admit(finished) {
                ready.push(finished);
            }
        }
        ready
    }

    /// Wait for the next result that is still current.
    pub async fn recv(&mut self) -> Option<Finished<T>> {
        while let Some(finished) = self.rx.recv().await {
            if let Some(finished) = self.admit(finished) {
                return Some(finished);
            }
        }
        None
    }
}

impl<T: Send + 'static> Default for LoadQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
