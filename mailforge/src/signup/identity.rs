//! Credential generation for signup attempts.
//!
//! Every attempt draws a fresh local part, display name and password; nothing
//! is reused across accounts.

use rand::prelude::*;

const ADJECTIVES: &[&str] = &[
    "quiet", "amber", "brisk", "cedar", "dusty", "early", "faded", "gentle", "hollow", "ivory",
    "jolly", "keen", "lunar", "mossy", "noble", "oaken", "pale", "rapid", "solar", "tidal",
    "umber", "vivid", "wry", "young",
];

const NOUNS: &[&str] = &[
    "falcon", "harbor", "meadow", "otter", "pine", "quill", "ridge", "sparrow", "thicket",
    "willow", "anchor", "beacon", "cobble", "drift", "ember", "fern", "grove", "heron", "inlet",
    "juniper", "kestrel", "lantern", "marsh", "nettle",
];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Bruno", "Clara", "Dmitri", "Elena", "Felix", "Greta", "Hugo", "Iris", "Jonas",
    "Katya", "Liam", "Mara", "Nils", "Odette", "Pavel", "Quinn", "Rosa", "Stefan", "Tessa",
    "Ursula", "Viktor", "Wanda", "Yara",
];

const LAST_NAMES: &[&str] = &[
    "Adler", "Bergman", "Castell", "Dawson", "Engel", "Fischer", "Garrett", "Holt", "Ivers",
    "Jensen", "Keller", "Lindqvist", "Mercer", "Novak", "Ortega", "Petrov", "Quimby", "Rhodes",
    "Sandoval", "Thorne", "Ulrich", "Vance", "Welles", "Ybarra",
];

/// Generated passwords always hit this length.
pub const PASSWORD_LENGTH: usize = 12;

// Ambiguous glyphs (0/O, 1/l/I) left out.
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+";

/// Fresh credentials for one signup attempt.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Mailbox local part, lower-case alphanumeric only
    pub local_part: String,
    /// Display name registered with the auth provider
    pub full_name: String,
    /// Password satisfying the provider's complexity rules
    pub password: String,
}

/// Draw a fresh random identity.
pub fn generate() -> Identity {
    let mut rng = thread_rng();

    let raw_username = format!(
        "{}.{}{:02}",
        ADJECTIVES.choose(&mut rng).unwrap(),
        NOUNS.choose(&mut rng).unwrap(),
        rng.gen_range(0..100u32),
    );

    let full_name = format!(
        "{} {}",
        FIRST_NAMES.choose(&mut rng).unwrap(),
        LAST_NAMES.choose(&mut rng).unwrap(),
    );

    Identity {
        local_part: sanitize_local_part(&raw_username),
        full_name,
        password: generate_password(&mut rng),
    }
}

/// Pick an address domain from the configured allow-list.
pub fn pick_domain(domains: &[String]) -> &str {
    let mut rng = thread_rng();
    domains
        .choose(&mut rng)
        .map(String::as_str)
        .unwrap_or("tmailbox.net")
}

/// Lower-case and strip everything but ASCII alphanumerics.
pub fn sanitize_local_part(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Generate a password with at least one character from each class.
fn generate_password(rng: &mut impl Rng) -> String {
    let classes: [&[u8]; 4] = [UPPER, LOWER, DIGITS, SYMBOLS];

    let mut chars: Vec<char> = classes
        .iter()
        .map(|class| *class.choose(rng).unwrap() as char)
        .collect();

    while chars.len() < PASSWORD_LENGTH {
        let class = classes.choose(rng).unwrap();
        chars.push(*class.choose(rng).unwrap() as char);
    }

    chars.shuffle(rng);
    chars.into_iter().collect()
}
