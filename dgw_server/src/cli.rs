use std::{env, env::VarError};

/// Environment variables echoed back by `--help`. Secrets are deliberately absent.
const DISPLAY_ENVS: [&str; 21] = [
    "RUST_LOG",
    "DGW_HOST",
    "DGW_PORT",
    "DGW_PUBLIC_URL",
    "DGW_HTTP_TIMEOUT",
    "DGW_PENDING_ORDER_TIMEOUT",
    "DGW_STORE",
    "DGW_DATA_DIR",
    "DGW_KV_URL",
    "DGW_CATALOG_PATH",
    "DGW_PACKAGES_DIR",
    "DGW_TOKEN_TTL",
    "DGW_TOKEN_MAX_USES",
    "DGW_SIMULATED_PROVIDER",
    "DGW_INVOICE_API_URL",
    "DGW_INVOICE_SUCCESS_URL",
    "DGW_MERCHANT_ADDRESS",
    "DGW_CHAIN_ID",
    "DGW_RPC_URL",
    "DGW_USD_CENTS_PER_NATIVE",
    "DGW_ENABLE_ADMIN",
];

/// The server has no options of its own. Any argument prints the version, or the help text and the current
/// configuration. Returns true if the server should exit instead of starting.
pub fn handle_command_line_args() -> bool {
    let Some(arg) = env::args().nth(1) else {
        return false;
    };
    match arg.as_str() {
        "-V" | "--version" => println!("dgw_server {}", env!("CARGO_PKG_VERSION")),
        _ => {
            display_readme();
            display_envs();
        },
    }
    true
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn env_value(name: &str) -> String {
    match env::var(name) {
        Ok(s) if s.is_empty() => "(empty)".into(),
        Ok(s) => s,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
    }
}

fn display_envs() {
    println!("Current environment values (EXCLUDING variables that contain secrets):");
    for name in DISPLAY_ENVS {
        println!("  {name:<35} {:<15}", env_value(name));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_secrets_are_displayed() {
        assert!(DISPLAY_ENVS.iter().all(|n| !n.contains("SECRET") && !n.contains("KEY") && !n.contains("TOKEN_S")));
        assert!(!DISPLAY_ENVS.contains(&"DGW_KV_TOKEN"));
    }
}
