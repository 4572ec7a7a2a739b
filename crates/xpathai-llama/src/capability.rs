//! Best-effort hardware acceleration detection.
//!
//! Detection never fails a start: any problem yields a CPU-only descriptor.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Layer count meaning "offload every layer".
pub const ALL_LAYERS: u32 = 999;

/// Acceleration settings passed to the inference server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acceleration {
    pub gpu_layers: Option<u32>,
    pub main_gpu: Option<u32>,
    pub device: Option<String>,
}

impl Acceleration {
    pub fn cpu() -> Self {
        Self::default()
    }

    pub fn is_gpu(&self) -> bool {
        self.gpu_layers.is_some_and(|layers| layers > 0)
    }

    /// `--n-gpu-layers` / `--main-gpu` launch arguments.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(layers) = self.gpu_layers {
            args.push("--n-gpu-layers".to_string());
            args.push(layers.to_string());
            if let Some(gpu) = self.main_gpu {
                args.push("--main-gpu".to_string());
                args.push(gpu.to_string());
            }
        }
        args
    }
}

/// Pluggable acceleration detection.
#[async_trait]
pub trait AccelerationProbe: Send + Sync {
    async fn detect(&self) -> Acceleration;
}

/// Always CPU.
pub struct NoAcceleration;

#[async_trait]
impl AccelerationProbe for NoAcceleration {
    async fn detect(&self) -> Acceleration {
        Acceleration::cpu()
    }
}

/// Configured override, no detection.
pub struct FixedAcceleration(pub Acceleration);

#[async_trait]
impl AccelerationProbe for FixedAcceleration {
    async fn detect(&self) -> Acceleration {
        self.0.clone()
    }
}

/// Apple Silicon always has Metal; other Macs run on CPU.
pub struct MetalProbe;

#[async_trait]
impl AccelerationProbe for MetalProbe {
    async fn detect(&self) -> Acceleration {
        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            Acceleration {
                gpu_layers: Some(ALL_LAYERS),
                main_gpu: None,
                device: Some("Apple Metal".to_string()),
            }
        } else {
            Acceleration::cpu()
        }
    }
}

/// One row of `nvidia-smi` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuDevice {
    pub index: u32,
    pub name: String,
    pub free_mib: u64,
}

/// Queries `nvidia-smi` and picks the device with the most free memory.
pub struct NvidiaSmiProbe {
    binary: String,
    timeout: Duration,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self {
            binary: "nvidia-smi".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn query(&self) -> Result<String, String> {
        let output = Command::new(&self.binary)
            .args([
                "--query-gpu=index,name,memory.free",
                "--format=csv,noheader,nounits",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| format!("timed out after {:?}", self.timeout))?
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(format!("exited with {}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccelerationProbe for NvidiaSmiProbe {
    async fn detect(&self) -> Acceleration {
        let stdout = match self.query().await {
            Ok(stdout) => stdout,
            Err(e) => {
                debug!("GPU detection via {} failed: {}", self.binary, e);
                return Acceleration::cpu();
            }
        };

        match best_device(&parse_nvidia_smi(&stdout)) {
            Some(device) => {
                info!(
                    "Using GPU {} ({}, {} MiB free)",
                    device.index, device.name, device.free_mib
                );
                Acceleration {
                    gpu_layers: Some(ALL_LAYERS),
                    main_gpu: Some(device.index),
                    device: Some(device.name.clone()),
                }
            }
            None => {
                debug!("No usable GPU reported by {}", self.binary);
                Acceleration::cpu()
            }
        }
    }
}

/// Parse `index, name, memory.free` CSV rows. Malformed rows are skipped.
pub fn parse_nvidia_smi(output: &str) -> Vec<GpuDevice> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(',').map(str::trim);
            let index = fields.next()?.parse().ok()?;
            let name = fields.next()?.to_string();
            let free_mib = fields.next()?.parse().ok()?;
            Some(GpuDevice {
                index,
                name,
                free_mib,
            })
        })
        .collect()
}

fn best_device(devices: &[GpuDevice]) -> Option<&GpuDevice> {
    devices
        .iter()
        .filter(|d| d.free_mib > 0)
        .max_by_key(|d| (d.free_mib, std::cmp::Reverse(d.index)))
}

/// Probe for the given settings: explicit layers win, then platform detection.
pub fn default_probe(
    detect: bool,
    gpu_layers: Option<u32>,
    main_gpu: Option<u32>,
) -> Arc<dyn AccelerationProbe> {
    if let Some(layers) = gpu_layers {
        return Arc::new(FixedAcceleration(Acceleration {
            gpu_layers: Some(layers),
            main_gpu,
            device: None,
        }));
    }
    if !detect {
        return Arc::new(NoAcceleration);
    }
    if cfg!(target_os = "macos") {
        Arc::new(MetalProbe)
    } else {
        Arc::new(NvidiaSmiProbe::new())
    }
}
