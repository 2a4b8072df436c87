//! Device Locator - finds physical input devices by identity
//!
//! Right after boot the input subsystem may not have enumerated every device
//! yet, so lookups are retried a small, fixed number of times with a short
//! backoff before giving up with [`DeviceError::DeviceNotFound`].

use super::error::DeviceError;
use crate::config::RetryConfig;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Directory the kernel exposes event device nodes in.
pub const INPUT_DIR: &str = "/dev/input";

/// What the locator and reaper need to know about an input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub path: PathBuf,
    pub name: String,
    /// Physical bus address; empty or absent for synthesized devices.
    pub phys: Option<String>,
}

impl DeviceDescriptor {
    pub fn has_bus_address(&self) -> bool {
        self.phys.as_deref().is_some_and(|phys| !phys.is_empty())
    }
}

/// Source of input device listings.
pub trait InputEnumerator: Send + Sync {
    fn enumerate(&self) -> io::Result<Vec<DeviceDescriptor>>;
}

/// Lists the host's event devices through evdev.
#[derive(Debug, Clone, Default)]
pub struct EvdevEnumerator;

impl InputEnumerator for EvdevEnumerator {
    fn enumerate(&self) -> io::Result<Vec<DeviceDescriptor>> {
        // evdev skips unreadable nodes silently; a missing directory means the
        // subsystem is not up yet, which the caller should see as an error.
        std::fs::read_dir(Path::new(INPUT_DIR))?;

        Ok(evdev::enumerate()
            .map(|(path, device)| DeviceDescriptor {
                path,
                name: device.name().unwrap_or_default().to_string(),
                phys: device.physical_path().map(str::to_string),
            })
            .collect())
    }
}

/// Bounded retry with a fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

pub struct DeviceLocator<E> {
    enumerator: E,
    retry: RetryPolicy,
}

impl<E: InputEnumerator> DeviceLocator<E> {
    pub fn new(enumerator: E, retry: RetryPolicy) -> Self {
        Self { enumerator, retry }
    }

    /// Returns the first device accepted by `predicate`.
    ///
    /// Both enumeration errors and an empty match are retried until the
    /// attempt budget is spent.
    pub async fn find<P>(&self, what: &str, predicate: P) -> Result<DeviceDescriptor, DeviceError>
    where
        P: Fn(&DeviceDescriptor) -> bool,
    {
        for attempt in 1..=self.retry.attempts {
            match self.enumerator.enumerate() {
                Ok(devices) => {
                    debug!(
                        "Attempt {}/{}: {} input devices enumerated",
                        attempt,
                        self.retry.attempts,
                        devices.len()
                    );
                    if let Some(device) = devices.into_iter().find(|d| predicate(d)) {
                        info!("Found {} at {}", what, device.path.display());
                        return Ok(device);
                    }
                    warn!(
                        "{} not present yet (attempt {}/{})",
                        what, attempt, self.retry.attempts
                    );
                }
                Err(e) => {
                    warn!(
                        "Input enumeration failed (attempt {}/{}): {}",
                        attempt, self.retry.attempts, e
                    );
                }
            }

            if attempt < self.retry.attempts {
                tokio::time::sleep(self.retry.backoff).await;
            }
        }

        Err(DeviceError::DeviceNotFound {
            what: what.to_string(),
            attempts: self.retry.attempts,
        })
    }

    pub fn enumerator(&self) -> &E {
        &self.enumerator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued enumeration results; the last one repeats forever.
    struct ScriptedEnumerator {
        script: Mutex<VecDeque<io::Result<Vec<DeviceDescriptor>>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedEnumerator {
        fn new(script: Vec<io::Result<Vec<DeviceDescriptor>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl InputEnumerator for ScriptedEnumerator {
        fn enumerate(&self) -> io::Result<Vec<DeviceDescriptor>> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front().unwrap() {
                    Ok(devices) => Ok(devices.clone()),
                    Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                }
            }
        }
    }

    fn device(path: &str, name: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            path: PathBuf::from(path),
            name: name.to_string(),
            phys: Some("usb-0000:03:00.3-4/input0".to_string()),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn finds_device_on_first_attempt() {
        let locator = DeviceLocator::new(
            ScriptedEnumerator::new(vec![Ok(vec![
                device("/dev/input/event0", "Power Button"),
                device("/dev/input/event5", "pad"),
            ])]),
            fast_retry(),
        );

        let found = locator.find("gamepad", |d| d.name == "pad").await.unwrap();
        assert_eq!(found.path, PathBuf::from("/dev/input/event5"));
        assert_eq!(locator.enumerator().calls(), 1);
    }

    #[tokio::test]
    async fn retries_through_transient_failures() {
        let locator = DeviceLocator::new(
            ScriptedEnumerator::new(vec![
                Err(io::Error::new(io::ErrorKind::NotFound, "no /dev/input")),
                Ok(vec![]),
                Ok(vec![device("/dev/input/event5", "pad")]),
            ]),
            fast_retry(),
        );

        let found = locator.find("gamepad", |d| d.name == "pad").await.unwrap();
        assert_eq!(found.name, "pad");
        assert_eq!(locator.enumerator().calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bound() {
        let locator = DeviceLocator::new(
            ScriptedEnumerator::new(vec![Ok(vec![device("/dev/input/event0", "other")])]),
            fast_retry(),
        );

        let err = locator.find("keyboard", |d| d.name == "kbd").await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::DeviceNotFound { ref what, attempts: 3 } if what == "keyboard"
        ));
        assert_eq!(locator.enumerator().calls(), 3);
    }

    #[test]
    fn bus_address_presence() {
        let mut d = device("/dev/input/event9", "x");
        assert!(d.has_bus_address());
        d.phys = Some(String::new());
        assert!(!d.has_bus_address());
        d.phys = None;
        assert!(!d.has_bus_address());
    }
}
