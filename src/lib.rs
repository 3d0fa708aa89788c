pub mod bus;
pub mod chat;
pub mod completion;
pub mod config;
pub mod controller;
pub mod entity;
pub mod interface;
pub mod mirror;
pub mod server;
pub mod status;
pub mod store;
pub mod widget;
