use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Tunboot opens an frp tunnel from your remote encrypted profile", long_about = None)]
pub(crate) struct TunbootCli {
    /// address of the local service to expose
    #[arg(short = 'H', long = "host", default_value = "127.0.0.1")]
    pub local_addr: String,
    /// port of the local service to expose
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    pub local_port: u16,
    /// verbose tunnel client logging
    #[arg(short, long)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = TunbootCli::parse_from(["tunboot"]);
        assert_eq!(cli.local_addr, "127.0.0.1");
        assert_eq!(cli.local_port, 8080);
        assert!(!cli.debug);
    }

    #[test]
    fn short_flags_are_accepted() {
        let cli = TunbootCli::parse_from(["tunboot", "-H", "0.0.0.0", "-p", "3000", "-d"]);
        assert_eq!(cli.local_addr, "0.0.0.0");
        assert_eq!(cli.local_port, 3000);
        assert!(cli.debug);
    }
}
