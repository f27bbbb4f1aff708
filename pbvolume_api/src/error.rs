use std::fmt::{Debug, Display, Write};
use std::{borrow::Cow, panic::Location};

use strum_macros::IntoStaticStr;

/// Step of a lifecycle request at which an error occurred.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoStaticStr, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Create,
    Attach,
    ResolveDevice,
    Format,
    PrepareMountPoint,
    Register,
    Detach,
    Delete,
    Deregister,
    Mount,
    Unmount,
}

/// The driver could not be brought up from its configuration.
#[derive(Debug, Eq, thiserror::Error, PartialEq)]
pub enum InitializationError {
    #[error("Failed to load driver configuration from '{path}'")]
    LoadConfig { path: String },
    #[error("Failed to parse driver configuration")]
    ParseConfig,
    #[error("Invalid driver configuration: {0}")]
    InvalidConfig(String),
    #[error("No provider {field} configured and {env_var} is not set")]
    MissingCredential {
        field: &'static str,
        env_var: &'static str,
    },
    #[error("Failed to read instance identity from '{path}'")]
    ReadServerId { path: String },
    #[error("Failed to create state directory '{path}'")]
    CreateStateDirectory { path: String },
    #[error("Failed to build remote API client")]
    ApiClient,
}

/// A local filesystem or OS command failed. The diagnostic output of the
/// underlying command travels in the error source.
#[derive(Debug, Eq, thiserror::Error, PartialEq)]
pub enum LocalIoError {
    #[error("Failed to read block devices")]
    ReadBlockDevices,
    #[error("Failed to format '{device}'")]
    Format { device: String },
    #[error("Failed to create mount directory '{path}'")]
    CreateMountDirectory { path: String },
    #[error("Failed to write metadata file '{path}'")]
    WriteMetadata { path: String },
    #[error("Failed to mount '{device}' at '{path}'")]
    Mount { device: String, path: String },
    #[error("Failed to unmount '{path}'")]
    Unmount { path: String },
}

/// Each variant of `ErrorKind` is one category of failure a caller can
/// observe. Kinds are never translated into one another as errors travel up.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The remote provider rejected a request or reported it as failed. The
    /// message is the provider's, unmodified.
    #[error("{message}")]
    Provision { message: String },

    /// A remote request did not reach a terminal state within the poll budget.
    #[error("Timeout has expired after {attempts} status queries")]
    Timeout { attempts: u32 },

    /// No newly attached device appeared within the snapshot budget.
    #[error("No new device found after {attempts} snapshots")]
    DeviceNotFound { attempts: u32 },

    /// More than one device qualifies as the newly attached one.
    #[error("There is more than one new device: {}", candidates.join(", "))]
    AmbiguousDevice { candidates: Vec<String> },

    /// The request referenced a volume name that is not registered.
    #[error("Volume {name:?} does not exist")]
    NotFound { name: String },

    /// The volume name cannot be used as a remote display name and a file
    /// name.
    #[error("Invalid volume name {name:?}")]
    InvalidName { name: String },

    #[error(transparent)]
    LocalIo(#[from] LocalIoError),

    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error("Internal error: {0}")]
    Internal(&'static str),
}

#[derive(Debug)]
struct DriverErrorInner {
    kind: ErrorKind,
    stage: Option<Stage>,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct DriverError(Box<DriverErrorInner>);

impl DriverError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        DriverError(Box::new(DriverErrorInner {
            kind: kind.into(),
            stage: None,
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn provision(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provision {
            message: message.into(),
        })
    }

    #[track_caller]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound { name: name.into() })
    }

    #[track_caller]
    pub fn internal(message: &'static str) -> Self {
        Self::new(ErrorKind::Internal(message))
    }

    /// Annotates the error with the stage it happened in. The innermost
    /// annotation wins: an error that already carries a stage keeps it.
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.0.stage.get_or_insert(stage);
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    pub fn stage(&self) -> Option<Stage> {
        self.0.stage
    }
}

pub trait ReportError<T, K> {
    /// Convert this error into a structured DriverError.
    fn structured(self, kind: K) -> Result<T, DriverError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, DriverError> {
        match self {
            Some(t) => Ok(t),
            None => Err(DriverError(Box::new(DriverErrorInner {
                kind: kind.into(),
                stage: None,
                location: Location::caller(),
                source: None,
                context: Vec::new(),
            }))),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, DriverError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(DriverError(Box::new(DriverErrorInner {
                kind: kind.into(),
                stage: None,
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

pub trait DriverResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, DriverError>;

    /// Record the stage at which the error occurred.
    fn stage(self, stage: Stage) -> Result<T, DriverError>;
}

impl<T> DriverResultExt<T> for Result<T, DriverError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, DriverError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }

    fn stage(self, stage: Stage) -> Result<T, DriverError> {
        self.map_err(|e| e.at_stage(stage))
    }
}

/// The user-visible rendering: `<stage> failed: <kind>: <cause chain>`.
impl Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(stage) = self.0.stage {
            write!(f, "{stage} failed: ")?;
        }
        write!(f, "{}", self.0.kind)?;
        if let Some(ref source) = self.0.source {
            write!(f, ": {source:#}")?;
        }
        Ok(())
    }
}

impl Debug for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(stage) = self.0.stage {
            write!(f, "[{stage}] ")?;
        }
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source.as_ref().map(|e| e.as_ref() as _)
    }
}
