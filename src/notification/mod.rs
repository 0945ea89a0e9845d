pub mod relay;
pub mod slack;
