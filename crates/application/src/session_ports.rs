mod clock;
mod database;
mod engine;

pub use clock::SessionClock;
pub use database::{DatabaseClient, DatabaseConnection, StatusVariable, THREADS_CONNECTED_STATUS};
pub use engine::ContainerEngine;
