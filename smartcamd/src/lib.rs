pub mod api;
pub mod config;
pub mod notify;
pub mod ssdp;
pub mod status_feed;
pub mod subscriber_manager;
pub mod subscribers;
