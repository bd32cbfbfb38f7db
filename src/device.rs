use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use tracing::info;

use crate::error::Result;

/// First accelerator compiled in and present, otherwise the CPU.
pub fn select_device(force_cpu: bool) -> Result<Device> {
    let device = if force_cpu {
        info!("CPU requested on the command line");
        Device::Cpu
    } else if cuda_is_available() {
        Device::new_cuda(0)?
    } else if metal_is_available() {
        Device::new_metal(0)?
    } else {
        Device::Cpu
    };

    info!("Using {} device", device_label(&device));
    Ok(device)
}

pub fn is_accelerator(device: &Device) -> bool {
    !device.is_cpu()
}

pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA",
        Device::Metal(_) => "Metal",
    }
}
