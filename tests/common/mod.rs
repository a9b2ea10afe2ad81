#![allow(dead_code)]

pub mod fixtures;
pub mod harness;
pub mod mocks;
