pub mod codes;
pub mod locations;
