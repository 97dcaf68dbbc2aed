//! Issue a service token for the identity gate.
//!
//! ```text
//! SERVICE_TOKEN_SECRET=... archibus-token goals
//! ```

use archibus_api::auth::token::{issue_service_token, TokenConfig};
use archibus_core::validation::validate_service_name;

fn main() {
    dotenvy::dotenv().ok();

    let Some(service) = std::env::args().nth(1) else {
        eprintln!("usage: archibus-token <service-name>");
        std::process::exit(2);
    };
    let service = match validate_service_name(&service) {
        Ok(name) => name.to_string(),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let config = TokenConfig::from_env();
    match issue_service_token(&service, &config) {
        Ok(token) => println!("{token}"),
        Err(e) => {
            eprintln!("Failed to issue token: {e}");
            std::process::exit(1);
        }
    }
}
