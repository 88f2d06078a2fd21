pub mod accessibility;
pub mod app;
pub mod executor;
pub mod geometry;
