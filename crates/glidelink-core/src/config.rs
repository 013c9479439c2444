//! Declarative device configuration.
//!
//! A [`DeviceConfig`] pairs a [`PortConfig`] (which physical or virtual
//! channel to claim) with the name of the driver to bind to it. Configs are
//! immutable once loaded; the registry evaluates them in slot order and
//! uses [`PortConfig::overlaps`] to reject a later config that would claim
//! a resource an earlier one already holds.

use std::fmt;

/// TCP port the listener kind binds when no port is configured.
pub const DEFAULT_TCP_PORT: u16 = 4353;

/// Which channel a slot talks through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PortConfig {
    /// The slot is not used.
    #[default]
    Disabled,
    /// A serial port, identified by its platform index.
    Serial {
        /// Zero-based port index (`/dev/ttyS{index}`, `COM{index + 1}`).
        index: u32,
        /// Line speed in baud.
        baud_rate: u32,
    },
    /// A Bluetooth RFCOMM link to the given device address.
    Bluetooth {
        /// Device address, e.g. `"00:11:22:33:44:55"`.
        address: String,
    },
    /// Probe for an attached GPS automatically.
    Auto,
    /// The host's built-in positioning sensor.
    Internal,
    /// Listen for one TCP client on the given port.
    TcpListener {
        /// Local port to bind.
        port: u16,
    },
}

impl PortConfig {
    /// Whether this config describes a usable port at all.
    pub fn is_available(&self) -> bool {
        match self {
            PortConfig::Disabled => false,
            PortConfig::Bluetooth { address } => !address.is_empty(),
            PortConfig::Serial { baud_rate, .. } => *baud_rate > 0,
            PortConfig::Auto | PortConfig::Internal | PortConfig::TcpListener { .. } => true,
        }
    }

    /// Whether `self` and `other` would claim the same exclusive resource.
    ///
    /// Serial ports collide on the same index, Bluetooth links on the same
    /// address; every other kind collides with any other config of the same
    /// kind. A disabled config never overlaps anything.
    pub fn overlaps(&self, other: &PortConfig) -> bool {
        match (self, other) {
            (PortConfig::Disabled, _) | (_, PortConfig::Disabled) => false,
            (PortConfig::Serial { index: a, .. }, PortConfig::Serial { index: b, .. }) => a == b,
            (PortConfig::Bluetooth { address: a }, PortConfig::Bluetooth { address: b }) => {
                a.eq_ignore_ascii_case(b)
            }
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }

    /// Platform device path for a serial port index.
    pub fn serial_path(index: u32) -> String {
        if cfg!(windows) {
            format!("COM{}", index + 1)
        } else {
            format!("/dev/ttyS{index}")
        }
    }
}

impl fmt::Display for PortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortConfig::Disabled => write!(f, "disabled"),
            PortConfig::Serial { index, baud_rate } => {
                write!(f, "{} @ {baud_rate}", PortConfig::serial_path(*index))
            }
            PortConfig::Bluetooth { address } => write!(f, "bluetooth {address}"),
            PortConfig::Auto => write!(f, "auto"),
            PortConfig::Internal => write!(f, "internal"),
            PortConfig::TcpListener { port } => write!(f, "tcp :{port}"),
        }
    }
}

/// The configuration of one device slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// The channel to open.
    pub port: PortConfig,
    /// Catalog name of the driver to bind, e.g. `"Vega"`.
    pub driver: String,
}

impl DeviceConfig {
    /// A config for `driver` on `port`.
    pub fn new(port: PortConfig, driver: &str) -> Self {
        DeviceConfig {
            port,
            driver: driver.to_string(),
        }
    }

    /// A disabled slot.
    pub fn disabled() -> Self {
        DeviceConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial(index: u32) -> PortConfig {
        PortConfig::Serial {
            index,
            baud_rate: 4800,
        }
    }

    #[test]
    fn serial_overlap_by_index_only() {
        assert!(serial(2).overlaps(&serial(2)));
        assert!(
            serial(2).overlaps(&PortConfig::Serial {
                index: 2,
                baud_rate: 38400
            })
        );
        assert!(!serial(2).overlaps(&serial(3)));
    }

    #[test]
    fn bluetooth_overlap_by_address() {
        let a = PortConfig::Bluetooth {
            address: "00:11:22:33:44:55".into(),
        };
        let b = PortConfig::Bluetooth {
            address: "00:11:22:33:44:66".into(),
        };
        assert!(a.overlaps(&a.clone()));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn other_kinds_overlap_by_kind() {
        assert!(PortConfig::Internal.overlaps(&PortConfig::Internal));
        assert!(PortConfig::Auto.overlaps(&PortConfig::Auto));
        assert!(
            PortConfig::TcpListener { port: 1 }.overlaps(&PortConfig::TcpListener { port: 2 })
        );
        assert!(!PortConfig::Internal.overlaps(&serial(0)));
    }

    #[test]
    fn disabled_never_overlaps() {
        assert!(!PortConfig::Disabled.overlaps(&PortConfig::Disabled));
        assert!(!PortConfig::Disabled.overlaps(&serial(0)));
    }

    #[test]
    fn availability() {
        assert!(!PortConfig::Disabled.is_available());
        assert!(serial(0).is_available());
        assert!(
            !PortConfig::Bluetooth {
                address: String::new()
            }
            .is_available()
        );
        assert!(PortConfig::TcpListener { port: DEFAULT_TCP_PORT }.is_available());
    }

    #[test]
    fn serial_path_uses_platform_naming() {
        let path = PortConfig::serial_path(0);
        if cfg!(windows) {
            assert_eq!(path, "COM1");
        } else {
            assert_eq!(path, "/dev/ttyS0");
        }
    }
}
