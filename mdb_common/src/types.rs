//! Routing and identity types shared across crates.

use serde::{Deserialize, Serialize};

use crate::consts::{
    ADDRESS_ARRAY_LENGTH_MAX, DEVICE_NAME, FIRMWARE_NAME, FIRMWARE_VERSION, FORM_FACTOR,
    HARDWARE_NAME, HARDWARE_PART_NUMBER, PROCESSOR_NAME,
};

/// Small integer identifying a registered stream or downstream device.
pub type Address = u8;

/// Ordered hops from this device to the target device.
pub type AddressPath = heapless::Vec<Address, ADDRESS_ARRAY_LENGTH_MAX>;

/// Build an [`AddressPath`] from a slice, `None` if it has too many hops.
pub fn address_path(hops: &[Address]) -> Option<AddressPath> {
    AddressPath::from_slice(hops).ok()
}

/// Firmware identification block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    /// Firmware name.
    pub name: String,
    /// Firmware version string.
    pub version: String,
}

/// Hardware identification block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    /// Board name.
    pub name: String,
    /// Board part number.
    pub part_number: u32,
    /// Processor description.
    pub processor: String,
}

/// Everything the device reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device name.
    pub name: String,
    /// Mechanical form factor.
    pub form_factor: String,
    /// Firmware identification.
    pub firmware: FirmwareInfo,
    /// Hardware identification.
    pub hardware: HardwareInfo,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            name: DEVICE_NAME.to_string(),
            form_factor: FORM_FACTOR.to_string(),
            firmware: FirmwareInfo {
                name: FIRMWARE_NAME.to_string(),
                version: FIRMWARE_VERSION.to_string(),
            },
            hardware: HardwareInfo {
                name: HARDWARE_NAME.to_string(),
                part_number: HARDWARE_PART_NUMBER,
                processor: PROCESSOR_NAME.to_string(),
            },
        }
    }
}
