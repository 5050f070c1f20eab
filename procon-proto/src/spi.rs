//! Virtual SPI flash answering the console's calibration and color reads.
//!
//! Only the regions a console actually reads are mapped. Everything else reads
//! as erased flash (`0xFF`), which the console treats as "not present".

/// Largest payload a single SPI read reply can carry.
pub const MAX_READ_LEN: usize = 0x1D;

const ERASED: u8 = 0xFF;

const STICK_PARAMETERS: [u8; 18] = [
    0x0F, 0x30, 0x61, 0x96, 0x30, 0xF3, 0xD4, 0x14, 0x54, 0x41, 0x15, 0x54, 0xC7, 0x79, 0x9C, 0x33,
    0x36, 0x63,
];

struct Region {
    start: u32,
    bytes: &'static [u8],
}

const SERIAL_NUMBER: Region = Region {
    start: 0x6000,
    bytes: &[ERASED; 16],
};

const FACTORY_IMU_CALIBRATION: Region = Region {
    start: 0x6020,
    bytes: &[
        0xD3, 0xFF, 0xD5, 0xFF, 0x55, 0x01, 0x00, 0x40, 0x00, 0x40, 0x00, 0x40, 0x19, 0x00, 0xDD,
        0xFF, 0xDC, 0xFF, 0x3B, 0x34, 0x3B, 0x34, 0x3B, 0x34,
    ],
};

const FACTORY_STICK_CALIBRATION: Region = Region {
    start: 0x603D,
    bytes: &[
        // left stick
        0xBA, 0xF5, 0x62, 0x6F, 0xC8, 0x77, 0xED, 0x95, 0x5B, //
        // right stick
        0x16, 0xD8, 0x7D, 0xF2, 0xB5, 0x5F, 0x86, 0x65, 0x5E,
    ],
};

const COLORS: Region = Region {
    start: 0x6050,
    bytes: &[
        0x82, 0x82, 0x82, // body
        0x0F, 0x0F, 0x0F, // buttons
        0xFF, 0xFF, 0xFF, // left grip
        0xFF, 0xFF, 0xFF, // right grip
        0x01, // color info present
    ],
};

const SENSOR_PARAMETERS: Region = Region {
    start: 0x6080,
    bytes: &[
        0x50, 0xFD, 0x00, 0x00, 0xC6, 0x0F, //
        0x0F, 0x30, 0x61, 0x96, 0x30, 0xF3, 0xD4, 0x14, 0x54, 0x41, 0x15, 0x54, 0xC7, 0x79, 0x9C,
        0x33, 0x36, 0x63,
    ],
};

const RIGHT_STICK_PARAMETERS: Region = Region {
    start: 0x6098,
    bytes: &STICK_PARAMETERS,
};

// User calibration magic absent: 0xFF throughout.
const USER_CALIBRATION: Region = Region {
    start: 0x8010,
    bytes: &[ERASED; 0x18],
};

const REGIONS: [Region; 7] = [
    SERIAL_NUMBER,
    FACTORY_IMU_CALIBRATION,
    FACTORY_STICK_CALIBRATION,
    COLORS,
    SENSOR_PARAMETERS,
    RIGHT_STICK_PARAMETERS,
    USER_CALIBRATION,
];

/// Read one byte of virtual flash.
#[must_use]
pub fn read_byte(address: u32) -> u8 {
    REGIONS
        .iter()
        .find_map(|region| {
            let offset = address.checked_sub(region.start)? as usize;
            region.bytes.get(offset).copied()
        })
        .unwrap_or(ERASED)
}

/// Fill `out` with flash contents starting at `address`.
///
/// Addresses past `u32::MAX` read as erased.
pub fn read(address: u32, out: &mut [u8]) {
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u32::try_from(i)
            .ok()
            .and_then(|i| address.checked_add(i))
            .map_or(ERASED, read_byte);
    }
}
