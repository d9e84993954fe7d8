pub mod agent_adapter;
pub mod config;
pub mod devices;
pub mod recording;
pub mod report_view;
pub mod session_runner;
pub mod speaker;
