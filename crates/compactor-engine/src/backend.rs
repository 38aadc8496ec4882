//! `compact.exe` compression backend
//!
//! One process per batch. `compact.exe` only reports a single exit code for all
//! paths, so when it fails each path's state is read back to tell which files
//! made it.

use crate::attributes::PlatformAttributeReader;
use compactor_types::{
    AlgorithmChoice, AttributeReader, CheckDepth, CompressionBackend, Error, OperationMode,
    PathStatus, Result,
};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Which `compact.exe` call to make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactFlavour {
    /// WOF compression with an explicit algorithm
    Modern,
    /// Legacy NTFS compression, which sets the attribute bit
    Branding,
}

/// Backend that shells out to `compact.exe`
#[derive(Clone)]
pub struct CompactBackend {
    flavour: CompactFlavour,
    reader: Arc<dyn AttributeReader>,
    program: PathBuf,
}

impl std::fmt::Debug for CompactBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompactBackend")
            .field("flavour", &self.flavour)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl CompactBackend {
    /// WOF backend
    pub fn new() -> Self {
        Self {
            flavour: CompactFlavour::Modern,
            reader: Arc::new(PlatformAttributeReader::new()),
            program: PathBuf::from("compact.exe"),
        }
    }

    /// Legacy marking backend
    pub fn branding() -> Self {
        Self {
            flavour: CompactFlavour::Branding,
            ..Self::new()
        }
    }

    /// Backend matching an operation mode
    pub fn for_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Branding => Self::branding(),
            OperationMode::Normal | OperationMode::Thorough => Self::new(),
        }
    }

    /// Replace the reader used to resolve per-path status
    pub fn with_reader(mut self, reader: Arc<dyn AttributeReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Run a different executable
    pub fn with_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = program.into();
        self
    }

    /// Backend flavour
    pub fn flavour(&self) -> CompactFlavour {
        self.flavour
    }

    /// Arguments for one invocation
    pub fn command_args(&self, paths: &[PathBuf], algorithm: AlgorithmChoice) -> Vec<String> {
        let mut args = vec!["/c".to_string(), "/a".to_string(), "/i".to_string()];
        if self.flavour == CompactFlavour::Modern {
            if let Some(name) = algorithm.compact_name() {
                args.push(format!("/exe:{}", name));
            }
        }
        args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(args);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(winapi::um::winbase::CREATE_NO_WINDOW);
        }
        command
    }

    fn resolve_per_path(&self, paths: &[PathBuf], message: &str) -> Vec<(PathBuf, PathStatus)> {
        paths
            .iter()
            .map(|path| {
                let status = match self.reader.read_compression_state(path, CheckDepth::Fast) {
                    Ok(reading) if reading.state.is_compressed() => PathStatus::Applied,
                    Ok(_) => PathStatus::Failed(message.to_string()),
                    Err(e) => PathStatus::Failed(e.to_string()),
                };
                (path.clone(), status)
            })
            .collect()
    }
}

impl Default for CompactBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionBackend for CompactBackend {
    fn apply(&self, paths: &[PathBuf], algorithm: AlgorithmChoice) -> Result<Vec<(PathBuf, PathStatus)>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        if self.flavour == CompactFlavour::Modern && algorithm.compact_name().is_none() {
            return Err(Error::backend("no algorithm given for a WOF batch"));
        }

        let args = self.command_args(paths, algorithm);
        debug!(
            "Running {} with {} paths ({})",
            self.program.display(),
            paths.len(),
            algorithm
        );

        let output = self.command(&args).output().map_err(|e| {
            error!("Failed to start {}: {}", self.program.display(), e);
            Error::backend(format!("failed to start {}: {}", self.program.display(), e))
        })?;

        if output.status.success() {
            return Ok(paths
                .iter()
                .map(|p| (p.clone(), PathStatus::Applied))
                .collect());
        }

        let message = format!("{} exited with {}", self.program.display(), output.status);
        warn!("{}, checking each file", message);
        Ok(self.resolve_per_path(paths, &message))
    }

    fn name(&self) -> &str {
        match self.flavour {
            CompactFlavour::Modern => "compact",
            CompactFlavour::Branding => "compact-branding",
        }
    }
}
