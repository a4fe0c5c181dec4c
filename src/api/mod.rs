pub mod client;
pub mod types;

pub use client::{ApiClient, EventQuery, Resource};
pub use types::{Dimension, Payload, PointsPayload};
