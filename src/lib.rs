pub mod controller;
pub mod utils;
