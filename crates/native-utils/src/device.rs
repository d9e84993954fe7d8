use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// One audio device as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub is_default: bool,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, " * {}({}ch, {}hz)", self.name, self.channels, self.sample_rate)?;
        if self.is_default {
            f.write_str(" [default]")?;
        }
        Ok(())
    }
}

/// Finds the input device called `device_name`, or the host default when `None`.
pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("no default input device"),
        Some(target) => host
            .input_devices()
            .context("failed to enumerate input devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("input device '{target}' not found")),
    }
}

/// Finds the output device called `device_name`, or the host default when `None`.
pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("no default output device"),
        Some(target) => host
            .output_devices()
            .context("failed to enumerate output devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("output device '{target}' not found")),
    }
}

pub fn list_inputs() -> anyhow::Result<Vec<DeviceInfo>> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }
    let host = get_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let mut infos = Vec::new();
    for device in host.input_devices().context("failed to enumerate input devices")? {
        let Ok(name) = device.name() else { continue };
        // Devices without a usable default config cannot be opened anyway.
        let Ok(cfg) = device.default_input_config() else {
            tracing::debug!("skipping input device {name} without default config");
            continue;
        };
        infos.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels: cfg.channels(),
            sample_rate: cfg.sample_rate().0,
        });
    }
    Ok(infos)
}

pub fn list_outputs() -> anyhow::Result<Vec<DeviceInfo>> {
    let host = get_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mut infos = Vec::new();
    for device in host.output_devices().context("failed to enumerate output devices")? {
        let Ok(name) = device.name() else { continue };
        let Ok(cfg) = device.default_output_config() else {
            tracing::debug!("skipping output device {name} without default config");
            continue;
        };
        infos.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels: cfg.channels(),
            sample_rate: cfg.sample_rate().0,
        });
    }
    Ok(infos)
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    Ok(format_devices(&list_inputs()?))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    Ok(format_devices(&list_outputs()?))
}

fn format_devices(devices: &[DeviceInfo]) -> String {
    devices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
