mod facade;
mod state;

pub use facade::CatalogFacade;
pub use state::*;
