pub mod handlers;
pub mod live;
pub mod server;

pub use handlers::AppState;
pub use live::LiveUpdates;
pub use server::{build_router, run_server, ServerConfig};
