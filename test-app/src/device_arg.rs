// Parsing of `--device` arguments.
//
// Form: `<port>=<driver>`, where `<port>` is one of
//   serial:<index>[:<baud>]   (baud defaults to 4800)
//   bt:<address>
//   tcp:<port>
//   internal | auto | disabled

use anyhow::{Context, Result, bail};

use glidelink::{DeviceConfig, PortConfig};

const DEFAULT_BAUD: u32 = 4800;

pub fn parse_device(arg: &str) -> Result<DeviceConfig> {
    let (port, driver) = arg
        .split_once('=')
        .with_context(|| format!("{arg:?}: expected <port>=<driver>"))?;
    if driver.is_empty() {
        bail!("{arg:?}: driver name is empty");
    }
    Ok(DeviceConfig::new(parse_port(port)?, driver))
}

fn parse_port(port: &str) -> Result<PortConfig> {
    let (kind, rest) = port.split_once(':').unwrap_or((port, ""));
    let config = match kind.to_ascii_lowercase().as_str() {
        "serial" => {
            let (index, baud) = rest.split_once(':').unwrap_or((rest, ""));
            PortConfig::Serial {
                index: index.parse().context("invalid serial port index")?,
                baud_rate: if baud.is_empty() {
                    DEFAULT_BAUD
                } else {
                    baud.parse().context("invalid baud rate")?
                },
            }
        }
        "bt" if !rest.is_empty() => PortConfig::Bluetooth {
            address: rest.to_string(),
        },
        "tcp" => PortConfig::TcpListener {
            port: rest.parse().context("invalid tcp port number")?,
        },
        "internal" | "auto" | "disabled" if !rest.is_empty() => {
            bail!("{port:?}: {kind} takes no parameters")
        }
        "internal" => PortConfig::Internal,
        "auto" => PortConfig::Auto,
        "disabled" => PortConfig::Disabled,
        _ => bail!("{port:?}: unknown port"),
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_with_and_without_baud() {
        let config = parse_device("serial:2:19200=Vega").unwrap();
        assert_eq!(
            config.port,
            PortConfig::Serial {
                index: 2,
                baud_rate: 19200
            }
        );
        assert_eq!(config.driver, "Vega");

        let config = parse_device("serial:0=Generic").unwrap();
        assert_eq!(
            config.port,
            PortConfig::Serial {
                index: 0,
                baud_rate: DEFAULT_BAUD
            }
        );
    }

    #[test]
    fn other_port_kinds() {
        assert_eq!(
            parse_device("tcp:4353=NmeaOut").unwrap().port,
            PortConfig::TcpListener { port: 4353 }
        );
        assert_eq!(
            parse_device("BT:00:11:22:33:44:55=Generic").unwrap().port,
            PortConfig::Bluetooth {
                address: "00:11:22:33:44:55".into()
            }
        );
        assert!(parse_device("bt:=Generic").is_err());
        assert!(parse_device("internal:1=Generic").is_err());
        assert_eq!(parse_device("internal=Generic").unwrap().port, PortConfig::Internal);
    }

    #[test]
    fn malformed_arguments() {
        assert!(parse_device("serial:0").is_err());
        assert!(parse_device("serial:0:9600:1=Generic").is_err());
        assert!(parse_device("serial:x=Generic").is_err());
        assert!(parse_device("usb:0=Generic").is_err());
        assert!(parse_device("serial:0=").is_err());
    }
}
