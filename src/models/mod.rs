pub mod contact;
pub mod matching;
pub mod stats_models;
