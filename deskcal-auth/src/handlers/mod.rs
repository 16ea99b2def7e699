pub mod admin;
pub mod exports;
pub mod oauth;
pub mod session;
pub mod webhook;
