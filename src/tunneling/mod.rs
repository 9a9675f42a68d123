pub(crate) mod client_config;
pub(crate) mod controller;
pub(crate) mod session;
