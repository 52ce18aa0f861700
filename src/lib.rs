mod app;
mod config;
mod routes;
mod storage;
mod stress;
pub mod telemetry;

pub use app::{build, run, App};
pub use config::ServerConfig;
pub use routes::AppState;
pub use storage::UploadStore;
pub use stress::{spawn_telemetry_logger, spawn_upload_echo, EchoConfig};
