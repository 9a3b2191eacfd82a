//! Token minting for download sessions.

use crate::domain::ids::DownloadToken;
use crate::ports::Clock;
use ulid::Ulid;

/// Issues a fresh correlation token per served document.
pub trait IdGenerator: Send + Sync {
    fn generate_download_token(&self) -> DownloadToken;
}

/// ULID tokens whose time part comes from `clock`.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_download_token(&self) -> DownloadToken {
        let millis = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        DownloadToken::from(Ulid::from_parts(millis, rand::random()))
    }
}
