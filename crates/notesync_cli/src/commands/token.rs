//! Token command implementation.

use notesync_server::{AuthConfig, TokenValidator};

/// Runs the token command.
pub fn run(secret: &str, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let validator = TokenValidator::new(AuthConfig::new(secret.as_bytes().to_vec()));
    let token = validator.create_token(user)?;
    println!("{token}");
    Ok(())
}
