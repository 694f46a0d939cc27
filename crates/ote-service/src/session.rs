use ote_core::{CallerIdentity, OteError, OteResult};
use ote_crypto::IdentityKey;

/// One client session with the storage service.
///
/// The caller identity is fixed when the session opens and becomes the
/// innermost encryption key for everything stored through it.
#[derive(Debug)]
pub struct Session {
    id: u64,
    caller: Option<CallerIdentity>,
    identity: Option<IdentityKey>,
}

impl Session {
    pub(crate) fn new(id: u64, caller: Option<CallerIdentity>) -> Self {
        Self {
            id,
            caller,
            identity: caller.map(|c| IdentityKey::from_bytes(*c.as_bytes())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn caller(&self) -> Option<CallerIdentity> {
        self.caller
    }

    /// The per-caller key, or `AccessConflict` when the session has none.
    pub fn identity_key(&self) -> OteResult<&IdentityKey> {
        self.identity.as_ref().ok_or(OteError::AccessConflict)
    }
}
