#![allow(dead_code)]
#![allow(unused_variables)]
#![allow(unused_imports)]

pub mod error;
pub mod log;
pub mod settings;
pub mod util;
pub mod types;
pub mod api;
pub mod memory;
pub mod value;
pub mod cache;
pub mod synthetic;
pub mod printer;
pub mod containers;
pub mod lists;
pub mod records;
pub mod registry;
pub mod session;
pub mod safety;
pub mod format;
pub mod snapshot;

#[cfg(test)]
pub mod testing;
