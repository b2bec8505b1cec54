//! Adapter discovery and acquisition
//!
//! Locates the PL2303 by its fixed vendor/product ID, opens it and prepares the
//! interface so a [`RusbTransport`] can take over: configuration 1 is selected when
//! the device is unconfigured, the kernel's serial driver is detached, the interface
//! is claimed and the alternate setting selected.

use super::transfers::{RusbTransport, TransferTimeouts};
use crate::config::UsbSettings;
use common::{Error, Result};
use protocol::{PL2303_PRODUCT_ID, PL2303_VENDOR_ID};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use tracing::{debug, info, warn};

/// Summary of an attached adapter, as shown by `--list-devices`
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub bus_number: u8,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// Whether a vendor/product pair identifies a PL2303 adapter
pub fn is_adapter(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == PL2303_VENDOR_ID && product_id == PL2303_PRODUCT_ID
}

/// Enumerate every attached PL2303
pub fn list_adapters(context: &Context) -> Result<Vec<AdapterInfo>> {
    let devices = context.devices().map_err(acquisition_error)?;

    let mut adapters = Vec::new();
    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!(
                    "Skipping device {:03}:{:03}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };
        if !is_adapter(descriptor.vendor_id(), descriptor.product_id()) {
            continue;
        }

        // String descriptors need an open handle; leave them empty without access
        let strings = device.open().ok().map(|handle| {
            let read = |index: Option<u8>| {
                index.and_then(|idx| handle.read_string_descriptor_ascii(idx).ok())
            };
            (
                read(descriptor.manufacturer_string_index()),
                read(descriptor.product_string_index()),
                read(descriptor.serial_number_string_index()),
            )
        });
        let (manufacturer, product, serial_number) = strings.unwrap_or((None, None, None));

        adapters.push(AdapterInfo {
            bus_number: device.bus_number(),
            device_address: device.address(),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            manufacturer,
            product,
            serial_number,
        });
    }

    Ok(adapters)
}

/// Find the first attached adapter, open it and claim its interface
///
/// Fails with [`Error::Acquisition`] when no adapter is attached or it cannot be
/// opened, configured or claimed. Nothing is left claimed on failure.
pub fn open_adapter(context: &Context, settings: &UsbSettings) -> Result<RusbTransport> {
    let device = find_adapter(context)?;
    info!(
        "Found PL2303 adapter on bus {:03} device {:03}",
        device.bus_number(),
        device.address()
    );

    let handle = device.open().map_err(|e| {
        warn!("Failed to open adapter: {}", e);
        match e {
            rusb::Error::Access => Error::Acquisition(
                "permission denied opening the adapter (check udev rules)".to_string(),
            ),
            _ => acquisition_error(e),
        }
    })?;

    ensure_configured(&handle)?;

    let interface = settings.interface;
    let detached = detach_kernel_driver(&handle, interface);

    if let Err(e) = handle.claim_interface(interface) {
        warn!("Failed to claim interface {}: {}", interface, e);
        if detached {
            reattach_kernel_driver(&handle, interface);
        }
        return Err(Error::Acquisition(format!(
            "failed to claim interface {}: {}",
            interface, e
        )));
    }
    debug!("Claimed interface {}", interface);

    if let Err(e) = handle.set_alternate_setting(interface, settings.alt_setting) {
        warn!(
            "Failed to select alternate setting {} on interface {}: {}",
            settings.alt_setting, interface, e
        );
        if let Err(e) = handle.release_interface(interface) {
            debug!("Could not release interface {}: {}", interface, e);
        }
        if detached {
            reattach_kernel_driver(&handle, interface);
        }
        return Err(Error::Acquisition(format!(
            "failed to select alternate setting {}: {}",
            settings.alt_setting, e
        )));
    }

    let product = read_product_string(&device, &handle);
    debug!("Product string: {:?}", product);

    Ok(RusbTransport::new(
        handle,
        interface,
        settings.alt_setting,
        detached,
        product,
        TransferTimeouts::from_settings(settings),
    ))
}

fn find_adapter(context: &Context) -> Result<Device<Context>> {
    let devices = context.devices().map_err(acquisition_error)?;

    devices
        .iter()
        .find(|device| {
            device
                .device_descriptor()
                .is_ok_and(|d| is_adapter(d.vendor_id(), d.product_id()))
        })
        .ok_or_else(|| {
            Error::Acquisition(format!(
                "no PL2303 adapter ({:04x}:{:04x}) attached",
                PL2303_VENDOR_ID, PL2303_PRODUCT_ID
            ))
        })
}

/// Select configuration 1 when the device reports no active configuration
fn ensure_configured(handle: &DeviceHandle<Context>) -> Result<()> {
    match handle.active_configuration() {
        Ok(0) => {
            debug!("Adapter is unconfigured, selecting configuration 1");
            handle
                .set_active_configuration(1)
                .map_err(|e| Error::Acquisition(format!("failed to set configuration: {}", e)))
        }
        Ok(value) => {
            debug!("Adapter already in configuration {}", value);
            Ok(())
        }
        Err(e) => Err(acquisition_error(e)),
    }
}

/// Detach the kernel driver if one is bound; returns whether it was detached
fn detach_kernel_driver(handle: &DeviceHandle<Context>, interface: u8) -> bool {
    match handle.kernel_driver_active(interface) {
        Ok(true) => {
            debug!("Detaching kernel driver from interface {}", interface);
            match handle.detach_kernel_driver(interface) {
                Ok(()) => true,
                Err(e) => {
                    // Claiming will report the real failure
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    );
                    false
                }
            }
        }
        Ok(false) => {
            debug!("No kernel driver active on interface {}", interface);
            false
        }
        Err(e) => {
            debug!(
                "Could not check kernel driver status for interface {}: {}",
                interface, e
            );
            false
        }
    }
}

pub(crate) fn reattach_kernel_driver(handle: &DeviceHandle<Context>, interface: u8) {
    match handle.attach_kernel_driver(interface) {
        Ok(()) => debug!("Reattached kernel driver to interface {}", interface),
        Err(e) => debug!(
            "Could not reattach kernel driver to interface {}: {}",
            interface, e
        ),
    }
}

fn read_product_string(device: &Device<Context>, handle: &DeviceHandle<Context>) -> Option<String> {
    device
        .device_descriptor()
        .ok()?
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok())
}

fn acquisition_error(err: rusb::Error) -> Error {
    Error::Acquisition(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_filter() {
        assert!(is_adapter(0x067B, 0x2303));
        assert!(!is_adapter(0x067B, 0x23A3));
        assert!(!is_adapter(0x0403, 0x2303));
    }

    #[test]
    fn test_acquisition_error_message() {
        let err = acquisition_error(rusb::Error::NoDevice);
        assert!(matches!(err, Error::Acquisition(_)));
        assert!(err.to_string().starts_with("Device acquisition failed"));
    }
}
