pub mod app;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod queries;
pub mod state;
pub mod storage;
pub mod store;
pub mod ui;

pub use app::router;
pub use state::AppState;
pub use storage::{Storage, resolve_data_dir};
pub use store::Store;
