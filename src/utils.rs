use anyhow::{anyhow, bail, Result};
use candle_core::Device;

/// Parses `auto`, `cpu`, `cuda`, `cuda:N`, `metal` or `metal:N`.
///
/// `auto` picks the first CUDA device when one is usable and the CPU otherwise.
pub fn parse_device(spec: &str) -> Result<Device> {
    let (kind, ordinal) = match spec.split_once(':') {
        Some((kind, ordinal)) => {
            let ordinal = ordinal
                .parse::<usize>()
                .map_err(|_| anyhow!("invalid device ordinal in {:?}", spec))?;
            (kind, ordinal)
        }
        None => (spec, 0),
    };
    let device = match kind.to_ascii_lowercase().as_str() {
        "auto" => Device::cuda_if_available(ordinal)?,
        "cpu" => Device::Cpu,
        "cuda" => Device::new_cuda(ordinal)?,
        "metal" => Device::new_metal(ordinal)?,
        _ => bail!("unknown device {:?}", spec),
    };
    Ok(device)
}

/// Seeds the device generator; the CPU backend has none to seed.
pub fn seed_device(device: &Device, seed: u64) -> Result<()> {
    if !device.is_cpu() {
        device.set_seed(seed)?;
    }
    Ok(())
}
