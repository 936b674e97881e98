pub mod callback;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod lifecycle;
pub mod logs;
pub mod notify;
pub mod resource;
pub mod shared;
pub mod template;
pub mod transport;
