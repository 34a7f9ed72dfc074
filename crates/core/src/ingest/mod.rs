pub mod normalize;
pub mod provider;
pub mod types;
