//! Key material held by the storage service. Every type here is zeroized on
//! drop and redacts itself in `Debug` output.

use zeroize::Zeroize;

use crate::{DEVICE_ID_SIZE, IDENTITY_KEY_SIZE, KEY_SIZE};

macro_rules! secret_bytes {
    ($(#[$doc:meta])* $name:ident, $len:expr) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name {
            bytes: [u8; $len],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self { bytes }
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

secret_bytes!(
    /// Hardware-unique identifier of the device, read once at service start.
    DeviceUniqueId,
    DEVICE_ID_SIZE
);

secret_bytes!(
    /// Device-bound 256-bit key, the middle layer of the cascade.
    MasterKey,
    KEY_SIZE
);

secret_bytes!(
    /// Device-bound 256-bit key, the outermost (storage) layer of the cascade.
    ContentKey,
    KEY_SIZE
);

secret_bytes!(
    /// Per-caller 128-bit key, the innermost layer of the cascade.
    IdentityKey,
    IDENTITY_KEY_SIZE
);
