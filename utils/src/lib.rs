pub mod random;
pub mod system;
pub mod traits;
