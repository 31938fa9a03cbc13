/// Email verification tokens and messages
///
/// A verification token is a 21-character identifier over a URL-safe
/// alphabet, drawn from a CSPRNG (~126 bits). It is stored on the user at
/// registration and emailed as part of a link to `GET /api/auth/verify/:token`.

use rand::Rng;

use crate::mail::OutgoingEmail;

/// Length of generated verification tokens
pub const TOKEN_LENGTH: usize = 21;

/// Subject line of the verification email
pub const VERIFY_SUBJECT: &str = "Verify your email";

const URL_SAFE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generates a fresh verification token
pub fn generate_verification_token() -> String {
    let mut rng = rand::thread_rng();

    (0..TOKEN_LENGTH)
        .map(|_| URL_SAFE_ALPHABET[rng.gen_range(0..URL_SAFE_ALPHABET.len())] as char)
        .collect()
}

/// Builds the absolute verification link for `token`
pub fn verification_link(base_url: &str, token: &str) -> String {
    format!("{}/api/auth/verify/{}", base_url.trim_end_matches('/'), token)
}

/// Composes the verification email for `email`
pub fn verification_email(email: &str, base_url: &str, token: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: email.to_string(),
        subject: VERIFY_SUBJECT.to_string(),
        html: format!(
            r#"<a target="_blank" href="{}">Click to verify your email</a>"#,
            verification_link(base_url, token)
        ),
    }
}
