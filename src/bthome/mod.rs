pub mod catalog;
pub mod decoder;

pub use catalog::WS90_CATALOG;
pub use decoder::{decode, DecodedFields};

/// 16-bit BTHome service UUID 0xFCD2 expanded to the Bluetooth base UUID
pub const BTHOME_SERVICE_UUID: bluer::Uuid =
    bluer::Uuid::from_u128(0x0000fcd2_0000_1000_8000_00805f9b34fb);
