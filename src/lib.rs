#![no_std]

extern crate alloc;

pub mod chat;
pub mod config;
pub mod controller;
#[cfg(feature = "jpeg")]
pub mod decode;
pub mod eye;
pub mod face;
pub mod framebuffer;
pub mod http;
pub mod input;
pub mod mode;
#[cfg(feature = "net")]
pub mod net;
pub mod poller;
pub mod render;
pub mod scene;
pub mod scheduler;
pub mod st7701;
pub mod state;
pub mod status;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
