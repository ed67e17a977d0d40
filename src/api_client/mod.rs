mod catalog;
mod error;
mod interceptor;
mod models;
mod transport;

pub use catalog::*;
pub use error::*;
pub use interceptor::AuthInterceptor;
pub use models::*;
pub use transport::*;
