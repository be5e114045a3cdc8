//! Guest identity: `GUEST_` plus a five-digit number, fixed for the session

use std::fmt;
use std::sync::OnceLock;

use rand::Rng;

pub const GUEST_PREFIX: &str = "GUEST_";

static SESSION_IDENTITY: OnceLock<GuestIdentity> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuestIdentity(String);

impl GuestIdentity {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(format!("{}{}", GUEST_PREFIX, rng.gen_range(10000..=99999)))
    }

    /// The identity for this process, generated on first use
    pub fn session() -> &'static GuestIdentity {
        SESSION_IDENTITY.get_or_init(|| Self::generate(&mut rand::thread_rng()))
    }

    /// Accept a previously issued identifier
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.strip_prefix(GUEST_PREFIX)?;
        let valid = digits.len() == 5
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !digits.starts_with('0');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
