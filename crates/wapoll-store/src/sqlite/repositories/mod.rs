//! Stateless repositories. Every method takes `&Connection`.

pub mod device;
