use crate::render::MarkerId;
use crate::weather::{report, WeatherClient};
use shared::messages::WeatherReport;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub struct PopupUpdate {
    pub marker: MarkerId,
    /// `WeatherTasks::generation` at the time of the request.
    pub generation: u64,
    pub report: WeatherReport,
}

/// Weather lookups owned by map markers.
///
/// Each lookup runs as its own task and reports through a channel. Removing
/// a marker aborts its task, so a lookup that resolves late never reaches a
/// marker that is gone. Updates that were already sent before `cancel_all`
/// carry an older generation and must be discarded by the receiver.
pub struct WeatherTasks {
    client: WeatherClient,
    pending: HashMap<MarkerId, JoinHandle<()>>,
    updates: mpsc::UnboundedSender<PopupUpdate>,
    generation: u64,
}

impl WeatherTasks {
    pub fn new(client: WeatherClient) -> (Self, mpsc::UnboundedReceiver<PopupUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tasks = Self {
            client,
            pending: HashMap::new(),
            updates: tx,
            generation: 0,
        };
        (tasks, rx)
    }

    /// Start a lookup for `marker`, replacing any lookup still running for it.
    pub fn request(&mut self, marker: MarkerId, lat: f64, lon: f64) {
        self.cancel(marker);

        let client = self.client.clone();
        let updates = self.updates.clone();
        let generation = self.generation;
        let handle = tokio::spawn(async move {
            let report = report(client.fetch_weather(lat, lon).await);
            let update = PopupUpdate {
                marker,
                generation,
                report,
            };
            if updates.send(update).is_err() {
                log::debug!("Weather update for marker {} dropped, map is gone", marker);
            }
        });
        self.pending.insert(marker, handle);
    }

    /// Abort the lookup for `marker`. Returns true if one was still running.
    pub fn cancel(&mut self, marker: MarkerId) -> bool {
        match self.pending.remove(&marker) {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                log::debug!("Cancelled weather lookup for marker {}", marker);
                true
            }
            _ => false,
        }
    }

    /// Abort every lookup and start a new generation.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Lookups that have not resolved yet.
    pub fn in_flight(&mut self) -> usize {
        self.pending.retain(|_, handle| !handle.is_finished());
        self.pending.len()
    }
}

impl Drop for WeatherTasks {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
