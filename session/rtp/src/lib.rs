pub mod channel;
pub mod database;
pub mod errors;
pub mod listener;
pub mod participant;
pub mod session;
pub mod ssrc;
