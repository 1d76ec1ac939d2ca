pub mod bandit;
pub mod blueprint;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod enhance;
pub mod exposure;
pub mod feedback;
pub mod filler;
pub mod lexicon;
pub mod quality;
pub mod resolver;
pub mod selector;
