pub mod assignment;
pub mod lifecycle;
pub mod rates;
