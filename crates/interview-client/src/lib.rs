mod client;
mod error;

pub use interview_types as types;
pub use client::{AgentApi, AgentClient, Config, ConfigBuilder, Stats, Upload};
pub use error::ClientError;
