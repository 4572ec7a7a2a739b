//! Launch command construction and process spawning.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::capability::Acceleration;

/// Everything needed to start one inference server process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub binary: PathBuf,
    pub model_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub ctx_size: u32,
    pub parallel: u32,
    pub acceleration: Acceleration,
    pub extra_args: Vec<String>,
}

impl LaunchSpec {
    /// Command-line arguments, binary excluded.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model_path.to_string_lossy().into_owned(),
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--ctx-size".to_string(),
            self.ctx_size.to_string(),
            "--parallel".to_string(),
            self.parallel.to_string(),
        ];
        args.extend(self.acceleration.launch_args());
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn command_line(&self) -> String {
        let mut parts = vec![self.binary.to_string_lossy().into_owned()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

/// Spawns the inference server process.
///
/// The child must have piped stdout and stderr so they can be drained.
pub trait Launcher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child>;
}

/// Spawns `spec.binary` with [`LaunchSpec::args`].
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child> {
        Command::new(&spec.binary)
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            binary: PathBuf::from("/opt/llama.cpp/llama-server"),
            model_path: PathBuf::from("/srv/models/m1.gguf"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            ctx_size: 4096,
            parallel: 2,
            acceleration: Acceleration::cpu(),
            extra_args: vec![],
        }
    }

    #[test]
    fn test_args_cpu() {
        assert_eq!(
            spec().args(),
            vec![
                "--model",
                "/srv/models/m1.gguf",
                "--host",
                "127.0.0.1",
                "--port",
                "8080",
                "--ctx-size",
                "4096",
                "--parallel",
                "2"
            ]
        );
    }

    #[test]
    fn test_args_gpu_and_extra() {
        let mut spec = spec();
        spec.acceleration = Acceleration {
            gpu_layers: Some(999),
            main_gpu: Some(0),
            device: Some("RTX".to_string()),
        };
        spec.extra_args = vec!["--flash-attn".to_string(), "on".to_string()];

        let args = spec.args();
        let tail: Vec<&str> = args[10..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec!["--n-gpu-layers", "999", "--main-gpu", "0", "--flash-attn", "on"]
        );
    }

    #[test]
    fn test_command_line() {
        assert!(spec()
            .command_line()
            .starts_with("/opt/llama.cpp/llama-server --model /srv/models/m1.gguf"));
    }

    #[tokio::test]
    async fn test_launch_missing_binary() {
        let mut spec = spec();
        spec.binary = PathBuf::from("/nonexistent/bin/llama-server");
        assert!(CommandLauncher.launch(&spec).is_err());
    }
}
