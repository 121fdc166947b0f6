//! Named device presets for emulation

use crate::Viewport;

const IOS_12_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 11_0 like Mac OS X) AppleWebKit/604.1.38 (KHTML, like Gecko) Version/11.0 Mobile/15A372 Safari/604.1";
const IOS_14_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Mobile/15E148 Safari/604.1";
const IOS_15_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";
const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 11_0 like Mac OS X) AppleWebKit/604.1.34 (KHTML, like Gecko) Version/11.0 Mobile/15A5341f Safari/604.1";
const PIXEL_2_UA: &str = "Mozilla/5.0 (Linux; Android 8.0; Pixel 2 Build/OPD3.170816.012) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.5993.70 Mobile Safari/537.36";
const PIXEL_5_UA: &str = "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.5993.70 Mobile Safari/537.36";
const GALAXY_UA: &str = "Mozilla/5.0 (Linux; Android 8.0.0; SM-G965U Build/R16NW) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.5993.70 Mobile Safari/537.36";
const NEXUS_5_UA: &str = "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.5993.70 Mobile Safari/537.36";
const NEXUS_7_UA: &str = "Mozilla/5.0 (Linux; Android 4.3; Nexus 7 Build/JSS15Q) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.5993.70 Safari/537.36";
const GALAXY_TAB_UA: &str = "Mozilla/5.0 (Linux; Android 8.1.0; SM-T837A) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.5993.70 Safari/537.36";

/// Emulation parameters for one named device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub mobile: bool,
    pub touch: bool,
    pub landscape: bool,
    pub user_agent: &'static str,
}

const fn device(
    name: &'static str,
    width: u32,
    height: u32,
    device_scale_factor: f64,
    landscape: bool,
    user_agent: &'static str,
) -> DeviceProfile {
    DeviceProfile {
        name,
        width,
        height,
        device_scale_factor,
        mobile: true,
        touch: true,
        landscape,
        user_agent,
    }
}

static KNOWN_DEVICES: &[DeviceProfile] = &[
    device("iPhone SE", 320, 568, 2.0, false, IOS_12_UA),
    device("iPhone X", 375, 812, 3.0, false, IOS_12_UA),
    device("iPhone X landscape", 812, 375, 3.0, true, IOS_12_UA),
    device("iPhone 11", 414, 828, 2.0, false, IOS_14_UA),
    device("iPhone 12", 390, 844, 3.0, false, IOS_14_UA),
    device("iPhone 12 Pro Max", 428, 926, 3.0, false, IOS_14_UA),
    device("iPhone 13", 390, 844, 3.0, false, IOS_15_UA),
    device("iPhone 13 Pro Max", 428, 926, 3.0, false, IOS_15_UA),
    device("Pixel 2", 411, 731, 2.625, false, PIXEL_2_UA),
    device("Pixel 5", 393, 851, 2.75, false, PIXEL_5_UA),
    device("Pixel 5 landscape", 851, 393, 2.75, true, PIXEL_5_UA),
    device("Galaxy S8", 360, 740, 4.0, false, GALAXY_UA),
    device("Galaxy S9+", 320, 658, 4.5, false, GALAXY_UA),
    device("Nexus 5", 360, 640, 3.0, false, NEXUS_5_UA),
    device("Nexus 7", 600, 960, 2.0, false, NEXUS_7_UA),
    device("Galaxy Tab S4", 712, 1138, 2.25, false, GALAXY_TAB_UA),
    device("iPad", 768, 1024, 2.0, false, IPAD_UA),
    device("iPad landscape", 1024, 768, 2.0, true, IPAD_UA),
    device("iPad Mini", 768, 1024, 2.0, false, IPAD_UA),
    device("iPad Pro", 1024, 1366, 2.0, false, IPAD_UA),
];

impl DeviceProfile {
    /// Find a device by its exact (case-sensitive) name.
    pub fn lookup(name: &str) -> Option<&'static DeviceProfile> {
        KNOWN_DEVICES.iter().find(|d| d.name == name)
    }

    /// Names of every built-in device, in table order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        KNOWN_DEVICES.iter().map(|d| d.name)
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
        }
    }
}
