use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::room::RoomController;

/// Owns every room controller and drives each control loop on its own
/// fixed-period timer. Rooms touch disjoint state keys and pins, so the
/// loops run independently with no cross-room locking.
pub struct Supervisor {
    rooms: Vec<Arc<RoomController>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(rooms: Vec<Arc<RoomController>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            rooms,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn rooms(&self) -> &[Arc<RoomController>] {
        &self.rooms
    }

    pub fn controller(&self, name: &str) -> Option<Arc<RoomController>> {
        self.rooms
            .iter()
            .find(|room| room.name() == name)
            .cloned()
    }

    pub async fn spawn(&self) {
        let mut tasks = self.tasks.lock().await;
        for room in &self.rooms {
            let room = room.clone();
            let mut shutdown = self.shutdown.subscribe();

            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(room.tick_period());
                loop {
                    tokio::select! {
                        _ = interval.tick() => room.tick().await,
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }
        info!("supervisor started {} room loop(s)", self.rooms.len());
    }

    /// Stops scheduling, waits for in-flight ticks to finish, then
    /// forwards stop to every controller.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let tasks = {
            let mut tasks = self.tasks.lock().await;
            std::mem::take(&mut *tasks)
        };
        for task in tasks {
            let _ = task.await;
        }

        for room in &self.rooms {
            room.stop();
        }
        info!("supervisor stopped");
    }
}
