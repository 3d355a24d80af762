pub mod errors;
pub mod packet;
pub mod rtcp;
pub mod version;
mod util;
