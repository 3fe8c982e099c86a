#![no_std]

pub mod rfm95;

pub use rfm95::*;
