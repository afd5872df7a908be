//! HID report types.

pub mod keyboard;

pub use keyboard::{KeyboardReport, KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};

/// bcdHID advertised in the HID Information characteristic.
pub const HID_SPEC_VERSION: u16 = 0x0101;

/// HID Information flags: remote wake | normally connectable.
pub const HID_INFO_FLAGS: u8 = 0x01 | 0x02;

/// HID Information characteristic value: bcdHID, country code, flags.
pub const HID_INFORMATION: [u8; 4] = [
    HID_SPEC_VERSION as u8,
    (HID_SPEC_VERSION >> 8) as u8,
    0x00,
    HID_INFO_FLAGS,
];
