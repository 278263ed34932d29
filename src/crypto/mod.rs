pub mod commitment;
pub mod hash;
pub mod signature;
