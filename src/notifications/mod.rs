mod feed;
mod stomp;
mod stream;

pub use feed::*;
pub use stomp::{Frame, StompError};
pub use stream::{ConnectionStatus, NotificationStream};
