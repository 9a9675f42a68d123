use rand::Rng;

use crate::config::EffectiveConfig;

pub(crate) const SESSION_NAME_LEN: usize = 6;
const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// frp client template. `%name%` appears twice (proxy-section name and
/// subdomain) and is substituted at every occurrence; all other placeholders
/// exactly once. User-controlled fields are inserted verbatim to keep the
/// output wire-compatible.
const CONFIG_TEMPLATE: &str = r#"[common]
server_addr = %server_addr%
server_port = %server_port%
token = %token%
protocol = kcp
log_level = %log_level%
pool_count = 2

[http-%name%]
type = http
local_ip = %local_ip%
local_port = %local_port%
use_encryption = false
use_compression = true
subdomain = %name%"#;

/// A short random identifier, used both as the internal proxy name and as
/// the public subdomain label.
pub(crate) fn session_name() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_NAME_LEN)
        .map(|_| NAME_ALPHABET[rng.gen_range(0..NAME_ALPHABET.len())] as char)
        .collect()
}

/// Renders the final client configuration text. Pure: the same input always
/// yields byte-identical output.
pub(crate) fn render(config: &EffectiveConfig, name: &str) -> String {
    let log_level = if config.debug { "trace" } else { "error" };
    CONFIG_TEMPLATE
        .replacen("%server_addr%", &config.server_addr, 1)
        .replacen("%server_port%", &config.server_port.to_string(), 1)
        .replacen("%token%", &config.token, 1)
        .replace("%name%", name)
        .replacen("%local_ip%", &config.local_addr, 1)
        .replacen("%local_port%", &config.local_port.to_string(), 1)
        .replacen("%log_level%", log_level, 1)
}
