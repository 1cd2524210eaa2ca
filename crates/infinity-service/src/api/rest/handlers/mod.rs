//! API request handlers

mod health;
mod pages;

pub use health::*;
pub use pages::*;
