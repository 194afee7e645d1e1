//! Object identity for message routing.
//!
//! Every object exposed over a connection is named by an [`ObjectUid`]: a
//! fixed-width, content-free byte string minted when the object is first
//! exposed and discarded with it. The all-zero value is the *null* uid and
//! never names a real object.

use serde::{Deserialize, Serialize};

/// Width in bytes of an [`ObjectUid`].
pub const OBJECT_UID_LEN: usize = 20;

/// 20-byte identifier unique to one exposed object on one connection.
///
/// Uids are compared, ordered and hashed by content, and serialize as their
/// raw bytes. `Default` produces the null uid, which is only ever used as a
/// sentinel.
///
/// # Examples
///
/// ```
/// use skerry_core::ObjectUid;
///
/// let uid = ObjectUid::random();
/// assert!(!uid.is_null());
///
/// let null = ObjectUid::default();
/// assert!(null.is_null());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ObjectUid([u8; OBJECT_UID_LEN]);

impl ObjectUid {
    /// Create a uid from its raw bytes.
    pub const fn from_bytes(bytes: [u8; OBJECT_UID_LEN]) -> Self {
        Self(bytes)
    }

    /// Mint a fresh random uid.
    ///
    /// Used by object owners at the moment an object is first exposed. The
    /// null value is excluded by construction.
    pub fn random() -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; OBJECT_UID_LEN];
        loop {
            rng.fill(&mut bytes[..]);
            if bytes != [0u8; OBJECT_UID_LEN] {
                return Self(bytes);
            }
        }
    }

    /// Raw bytes, in the order they appear on the wire.
    pub const fn as_bytes(&self) -> &[u8; OBJECT_UID_LEN] {
        &self.0
    }

    /// Whether this is the all-zero null uid.
    pub const fn is_null(&self) -> bool {
        let mut i = 0;
        while i < OBJECT_UID_LEN {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }
}

impl std::fmt::Display for ObjectUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl TryFrom<&[u8]> for ObjectUid {
    type Error = ObjectUidError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; OBJECT_UID_LEN] =
            slice
                .try_into()
                .map_err(|_| ObjectUidError::WrongLength {
                    actual: slice.len(),
                })?;
        Ok(Self(bytes))
    }
}

/// Error building an [`ObjectUid`] from raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectUidError {
    /// The input slice was not exactly [`OBJECT_UID_LEN`] bytes.
    #[error("object uid must be {OBJECT_UID_LEN} bytes, got {actual}")]
    WrongLength {
        /// Length of the rejected input.
        actual: usize,
    },
}
