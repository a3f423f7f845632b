use crate::error::ArgumentError;

/// `read-write` bit: without it, the store refuses every mutating call.
pub const READ_WRITE: u8 = 1 << 0;
/// `sync-on-put` bit: fsync the active segment after every `put`/`delete`.
pub const SYNC_ON_PUT: u8 = 1 << 1;

const KNOWN_BITS: u8 = READ_WRITE | SYNC_ON_PUT;

/// Bitset of store-open options: `{read-write, sync-on-put}`. Absence of
/// `READ_WRITE` implies read-only, which disallows `put`, `delete`, and
/// `merge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options(u8);

impl Options {
    pub const READ_ONLY: Options = Options(0);

    /// Builds an `Options` from raw bits, rejecting unknown bits.
    pub fn from_bits(bits: u8) -> Result<Options, ArgumentError> {
        if bits & !KNOWN_BITS != 0 {
            return Err(ArgumentError::UnknownOptionBits(bits));
        }
        Ok(Options(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn read_write() -> Options {
        Options(READ_WRITE)
    }

    pub fn with_sync_on_put(self) -> Options {
        Options(self.0 | SYNC_ON_PUT)
    }

    pub fn is_read_write(self) -> bool {
        self.0 & READ_WRITE != 0
    }

    pub fn is_sync_on_put(self) -> bool {
        self.0 & SYNC_ON_PUT != 0
    }
}
