pub mod delivery;
pub mod driver;
pub mod proof;
