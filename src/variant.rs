//! Hardware variant identification.
//!
//! The board identifier (DMI product name) is read once at startup and mapped
//! through a static table to exactly one [`VariantConfig`]. Unknown boards are
//! refused; the daemon never guesses a mapping.

use crate::controller::locator::DeviceDescriptor;
use crate::mapping::tables::{GEN1, GEN2};
use crate::mapping::ChordTable;
use evdev::RelativeAxisCode;
use std::fmt::{self, Display};
use std::path::Path;
use tracing::{debug, info};

/// Where the kernel exposes the board identifier.
pub const BOARD_ID_PATH: &str = "/sys/devices/virtual/dmi/id/product_name";

const ISSUE_URL: &str = "https://github.com/ShadowBlip/aya-neo-fixes";

/// Hardware families with distinct input wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Founders through 2021 Pro Retro Power
    Gen1,
    /// NEXT
    Gen2,
}

impl Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Gen1 => write!(f, "GEN1"),
            Variant::Gen2 => write!(f, "GEN2"),
        }
    }
}

const BOARDS: &[(&str, Variant)] = &[
    ("AYANEO 2021 Pro Retro Power", Variant::Gen1),
    ("AYA NEO 2021 Pro Retro Power", Variant::Gen1),
    ("AYANEO 2021 Pro", Variant::Gen1),
    ("AYA NEO 2021 Pro", Variant::Gen1),
    ("AYANEO 2021", Variant::Gen1),
    ("AYA NEO 2021", Variant::Gen1),
    ("AYANEO FOUNDERS", Variant::Gen1),
    ("AYA NEO FOUNDERS", Variant::Gen1),
    ("NEXT", Variant::Gen2),
];

/// Name and bus address of a physical device, matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: &'static str,
    pub phys: &'static str,
}

impl DeviceIdentity {
    pub fn matches(&self, device: &DeviceDescriptor) -> bool {
        device.name == self.name && device.phys.as_deref() == Some(self.phys)
    }
}

impl Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' @ {}", self.name, self.phys)
    }
}

const XBOX_PAD: DeviceIdentity = DeviceIdentity {
    name: "Microsoft X-Box 360 pad",
    phys: "usb-0000:03:00.3-4/input0",
};

const AT_KEYBOARD: DeviceIdentity = DeviceIdentity {
    name: "AT Translated Set 2 keyboard",
    phys: "isa0060/serio0/input0",
};

/// One axis of a 6-axis motion sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionAxis {
    GyroX,
    GyroY,
    GyroZ,
    AccelX,
    AccelY,
    AccelZ,
}

/// Motion sensor fitted to a variant and the axes forwarded from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSensorSpec {
    pub i2c_address: u8,
    /// Sample axis to relative axis code.
    pub axes: &'static [(MotionAxis, u16)],
}

const BMI160_ROTATION: MotionSensorSpec = MotionSensorSpec {
    i2c_address: 0x68,
    axes: &[
        (MotionAxis::GyroX, RelativeAxisCode::REL_RX.0),
        (MotionAxis::GyroY, RelativeAxisCode::REL_RY.0),
    ],
};

/// Everything that differs between hardware families. Selected once.
#[derive(Debug, Clone)]
pub struct VariantConfig {
    pub variant: Variant,
    pub board_id: String,
    pub keyboard: DeviceIdentity,
    pub gamepad: DeviceIdentity,
    pub chords: &'static ChordTable,
    pub motion: Option<MotionSensorSpec>,
}

#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    #[error(
        "{0} is not currently supported by this tool. Open an issue on github at {url} if this is a bug.",
        url = ISSUE_URL
    )]
    UnsupportedVariant(String),

    #[error("Unable to read board identifier from {path}: {source}")]
    Identification {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VariantConfig {
    pub fn for_variant(variant: Variant, board_id: impl Into<String>) -> Self {
        let (chords, motion) = match variant {
            Variant::Gen1 => (&GEN1, None),
            Variant::Gen2 => (&GEN2, Some(BMI160_ROTATION)),
        };
        Self {
            variant,
            board_id: board_id.into(),
            keyboard: AT_KEYBOARD,
            gamepad: XBOX_PAD,
            chords,
            motion,
        }
    }

    /// Maps a board identifier to its variant.
    pub fn from_board_id(board_id: &str) -> Result<Self, VariantError> {
        let board_id = board_id.trim();
        BOARDS
            .iter()
            .find(|(name, _)| *name == board_id)
            .map(|(_, variant)| Self::for_variant(*variant, board_id))
            .ok_or_else(|| VariantError::UnsupportedVariant(board_id.to_string()))
    }
}

/// Reads the board identifier and selects the variant.
pub fn identify_variant(path: &Path) -> Result<VariantConfig, VariantError> {
    debug!("Reading board identifier from {}", path.display());
    let board_id =
        std::fs::read_to_string(path).map_err(|source| VariantError::Identification {
            path: path.display().to_string(),
            source,
        })?;
    let config = VariantConfig::from_board_id(&board_id)?;
    info!(
        "Detected '{}' ({} hardware)",
        config.board_id, config.variant
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn known_boards_map_to_variants() {
        let gen1 = VariantConfig::from_board_id("AYANEO 2021 Pro\n").unwrap();
        assert_eq!(gen1.variant, Variant::Gen1);
        assert_eq!(gen1.chords.name, "GEN1");
        assert!(gen1.motion.is_none());

        let gen2 = VariantConfig::from_board_id("NEXT").unwrap();
        assert_eq!(gen2.variant, Variant::Gen2);
        assert_eq!(gen2.chords.name, "GEN2");
        assert_eq!(gen2.motion.map(|m| m.i2c_address), Some(0x68));
    }

    #[test]
    fn unknown_board_names_identifier() {
        let err = VariantConfig::from_board_id("Steam Deck").unwrap_err();
        assert!(matches!(err, VariantError::UnsupportedVariant(ref id) if id == "Steam Deck"));
        let message = err.to_string();
        assert!(message.contains("Steam Deck"));
        assert!(message.contains("Open an issue"));
    }

    #[test]
    fn identify_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product_name");
        std::fs::write(&path, "AYA NEO FOUNDERS\n").unwrap();
        assert_eq!(identify_variant(&path).unwrap().variant, Variant::Gen1);

        let missing = PathBuf::from("/nonexistent/product_name");
        assert!(matches!(
            identify_variant(&missing),
            Err(VariantError::Identification { .. })
        ));
    }

    #[test]
    fn identity_requires_exact_name_and_phys() {
        let mut device = DeviceDescriptor {
            path: PathBuf::from("/dev/input/event3"),
            name: AT_KEYBOARD.name.to_string(),
            phys: Some(AT_KEYBOARD.phys.to_string()),
        };
        assert!(AT_KEYBOARD.matches(&device));
        device.phys = Some("isa0060/serio0/input1".to_string());
        assert!(!AT_KEYBOARD.matches(&device));
        device.phys = None;
        assert!(!AT_KEYBOARD.matches(&device));
    }
}
