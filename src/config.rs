use serde::Deserialize;

use crate::cli::TunbootCli;

/// The decrypted remote document. Unknown fields are tolerated so the
/// service can ship new ones without breaking older clients.
#[derive(Deserialize, Debug, PartialEq)]
pub(crate) struct RemoteUserConfig {
    pub server_addr: String,
    pub server_port: u16,
    pub token: String,
    pub subdomain_host: String,
}

/// Remote fields merged with the CLI-supplied ones. Built once and never
/// mutated afterwards; every later stage takes it by reference.
#[derive(Debug, PartialEq)]
pub(crate) struct EffectiveConfig {
    pub server_addr: String,
    pub server_port: u16,
    pub token: String,
    pub subdomain_host: String,
    pub local_addr: String,
    pub local_port: u16,
    pub debug: bool,
}

impl EffectiveConfig {
    pub fn new(remote: RemoteUserConfig, cli: &TunbootCli) -> Self {
        EffectiveConfig {
            server_addr: remote.server_addr,
            server_port: remote.server_port,
            token: remote.token,
            subdomain_host: remote.subdomain_host,
            local_addr: cli.local_addr.clone(),
            local_port: cli.local_port,
            debug: cli.debug,
        }
    }
}
