pub mod remote;
pub mod rest;
pub mod state;

pub use remote::{RemoteEmbedder, RemoteOcr};
pub use rest::RestApi;
pub use state::{AppState, ServerConfig, MAX_UPLOAD_BYTES};
