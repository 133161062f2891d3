mod claims;
mod request;
mod response;
mod session;

pub use self::claims::*;
pub use self::request::*;
pub use self::response::*;
pub use self::session::*;
