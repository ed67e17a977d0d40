mod gateway;
mod guard;
mod state;

pub use gateway::AuthGateway;
pub use guard::*;
pub use state::*;
