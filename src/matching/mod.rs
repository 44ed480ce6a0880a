pub mod blocking;
pub mod manager;
pub mod normalize;
pub mod scorer;
pub mod similarity;
pub mod tiers;
pub mod weighted;
