//! Domain specific structures, implementations, and logic

pub mod webdriver;
