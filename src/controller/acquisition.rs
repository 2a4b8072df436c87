//! Exclusive acquisition and concealment of physical devices
//!
//! A device is first grabbed (EVIOCGRAB) so no other reader sees its events,
//! then its node is moved out of `/dev/input` so launchers do not enumerate it
//! next to the virtual device. Concealment is reversible through the
//! [`ConcealedDeviceRecord`] it returns.
//!
//! ```text
//!           conceal()
//! Visible ────────────► Concealed
//!    ▲                      │
//!    └──────────────────────┘
//!           restore()  (no-op when already visible)
//! ```

use super::error::DeviceError;
use super::locator::DeviceDescriptor;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// A device that can be opened and grabbed for exclusive access.
pub trait ExclusiveDevice: Sized + Send {
    fn open(path: &Path) -> io::Result<Self>;
    fn grab(&mut self) -> io::Result<()>;
}

impl ExclusiveDevice for evdev::Device {
    fn open(path: &Path) -> io::Result<Self> {
        evdev::Device::open(path)
    }

    fn grab(&mut self) -> io::Result<()> {
        evdev::Device::grab(self)
    }
}

/// A grabbed device. Dropping it releases the grab.
#[derive(Debug)]
pub struct AcquiredDevice<D> {
    pub descriptor: DeviceDescriptor,
    pub device: D,
}

/// Opens and grabs one device.
pub fn acquire<D: ExclusiveDevice>(
    descriptor: &DeviceDescriptor,
) -> Result<AcquiredDevice<D>, DeviceError> {
    let path = &descriptor.path;
    let mut device = D::open(path).map_err(|source| DeviceError::Open {
        path: path.clone(),
        source,
    })?;
    device
        .grab()
        .map_err(|source| DeviceError::AcquisitionFailed {
            path: path.clone(),
            source,
        })?;

    info!("Grabbed '{}' at {}", descriptor.name, path.display());
    Ok(AcquiredDevice {
        descriptor: descriptor.clone(),
        device,
    })
}

/// Where a concealed node came from and where it went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcealedDeviceRecord {
    pub original: PathBuf,
    pub concealed: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// Nothing at the concealed path; restored earlier or never concealed.
    AlreadyVisible,
}

impl ConcealedDeviceRecord {
    /// Moves the node back. Idempotent.
    pub fn restore(&self) -> Result<RestoreOutcome, DeviceError> {
        let present = self
            .concealed
            .try_exists()
            .map_err(|source| DeviceError::Restore {
                path: self.original.clone(),
                source,
            })?;
        if !present {
            debug!(
                "{} already visible, nothing to restore",
                self.original.display()
            );
            return Ok(RestoreOutcome::AlreadyVisible);
        }

        match std::fs::rename(&self.concealed, &self.original) {
            Ok(()) => {
                info!("Restored {}", self.original.display());
                Ok(RestoreOutcome::Restored)
            }
            // Lost a race with a concurrent restore.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RestoreOutcome::AlreadyVisible),
            Err(source) => Err(DeviceError::Restore {
                path: self.original.clone(),
                source,
            }),
        }
    }
}

/// Moves device nodes into a private directory.
#[derive(Debug, Clone)]
pub struct Concealer {
    dir: PathBuf,
}

impl Concealer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn conceal(&self, path: &Path) -> Result<ConcealedDeviceRecord, DeviceError> {
        let conceal_error = |source: io::Error| DeviceError::Conceal {
            path: path.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(conceal_error)?;
        let file_name = path.file_name().ok_or_else(|| {
            conceal_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "device path has no file name",
            ))
        })?;
        let concealed = self.dir.join(file_name);
        std::fs::rename(path, &concealed).map_err(conceal_error)?;

        info!("Concealed {} at {}", path.display(), concealed.display());
        Ok(ConcealedDeviceRecord {
            original: path.to_path_buf(),
            concealed,
        })
    }

    /// Conceals every path or none of them.
    pub fn conceal_all<'a, I>(&self, paths: I) -> Result<Vec<ConcealedDeviceRecord>, DeviceError>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut records = Vec::new();
        for path in paths {
            match self.conceal(path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!("Concealment failed, rolling back: {}", e);
                    for record in records.iter().rev() {
                        if let Err(restore_err) = record.restore() {
                            warn!("Rollback of {} failed: {}", record.original.display(), restore_err);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(records)
    }
}

/// Grabs every device, then conceals them all.
///
/// Nothing is concealed unless every grab succeeded. Devices come back in
/// the order of `descriptors`.
pub fn acquire_all<D: ExclusiveDevice>(
    descriptors: &[DeviceDescriptor],
    concealer: &Concealer,
) -> Result<(Vec<AcquiredDevice<D>>, Vec<ConcealedDeviceRecord>), DeviceError> {
    let devices = descriptors
        .iter()
        .map(acquire::<D>)
        .collect::<Result<Vec<_>, _>>()?;

    let records = concealer.conceal_all(devices.iter().map(|d| d.descriptor.path.as_path()))?;
    Ok((devices, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Stand-in for an evdev node backed by a regular file.
    #[derive(Debug)]
    struct FakeDevice;

    impl ExclusiveDevice for FakeDevice {
        fn open(path: &Path) -> io::Result<Self> {
            std::fs::metadata(path)?;
            Ok(FakeDevice)
        }

        fn grab(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Already grabbed by someone else.
    #[derive(Debug)]
    struct BusyDevice;

    impl ExclusiveDevice for BusyDevice {
        fn open(path: &Path) -> io::Result<Self> {
            std::fs::metadata(path)?;
            Ok(BusyDevice)
        }

        fn grab(&mut self) -> io::Result<()> {
            Err(io::Error::from_raw_os_error(16)) // EBUSY
        }
    }

    fn node(dir: &TempDir, name: &str) -> DeviceDescriptor {
        let path = dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        DeviceDescriptor {
            path,
            name: name.to_string(),
            phys: Some("isa0060/serio0/input0".to_string()),
        }
    }

    #[test]
    fn conceal_then_restore_twice() {
        let dev = TempDir::new().unwrap();
        let concealer = Concealer::new(dev.path().join("hidden"));
        let kbd = node(&dev, "event3");

        let record = concealer.conceal(&kbd.path).unwrap();
        assert!(!kbd.path.exists());
        assert!(record.concealed.exists());
        assert_eq!(record.concealed, dev.path().join("hidden").join("event3"));

        assert_eq!(record.restore().unwrap(), RestoreOutcome::Restored);
        assert!(kbd.path.exists());
        assert_eq!(record.restore().unwrap(), RestoreOutcome::AlreadyVisible);
        assert!(kbd.path.exists());
    }

    #[test]
    fn restore_of_never_concealed_node_is_noop() {
        let dev = TempDir::new().unwrap();
        let record = ConcealedDeviceRecord {
            original: dev.path().join("event7"),
            concealed: dev.path().join("hidden").join("event7"),
        };
        assert_eq!(record.restore().unwrap(), RestoreOutcome::AlreadyVisible);
    }

    #[test]
    fn acquire_all_conceals_every_device() {
        let dev = TempDir::new().unwrap();
        let concealer = Concealer::new(dev.path().join("hidden"));
        let kbd = node(&dev, "event3");
        let pad = node(&dev, "event5");

        let (devices, records) =
            acquire_all::<FakeDevice>(&[kbd.clone(), pad.clone()], &concealer).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].descriptor, kbd);
        assert_eq!(records.len(), 2);
        assert!(!kbd.path.exists());
        assert!(!pad.path.exists());
    }

    #[test]
    fn grabbed_device_fails_without_concealing_anything() {
        let dev = TempDir::new().unwrap();
        let concealer = Concealer::new(dev.path().join("hidden"));
        let kbd = node(&dev, "event3");

        let err = acquire_all::<BusyDevice>(&[kbd.clone()], &concealer).unwrap_err();
        assert!(matches!(err, DeviceError::AcquisitionFailed { .. }));
        assert!(kbd.path.exists());
        assert!(!concealer.dir().exists());
    }

    #[test]
    fn missing_device_fails_to_open() {
        let dev = TempDir::new().unwrap();
        let ghost = DeviceDescriptor {
            path: dev.path().join("event42"),
            name: "ghost".to_string(),
            phys: None,
        };
        let err = acquire::<FakeDevice>(&ghost).unwrap_err();
        assert!(matches!(err, DeviceError::Open { .. }));
    }

    #[test]
    fn partial_concealment_is_rolled_back() {
        let dev = TempDir::new().unwrap();
        let concealer = Concealer::new(dev.path().join("hidden"));
        let kbd = node(&dev, "event3");
        let missing = dev.path().join("event9");

        let err = concealer
            .conceal_all([kbd.path.as_path(), missing.as_path()])
            .unwrap_err();
        assert!(matches!(err, DeviceError::Conceal { .. }));
        assert!(kbd.path.exists());
        assert!(!concealer.dir().join("event3").exists());
    }
}
