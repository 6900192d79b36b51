use std::process::ExitCode;

use crate::Error;

pub fn exit_code(err: &Error) -> ExitCode {
    match err {
        Error::AlreadyInitialized { .. } => ExitCode::from(73),
        Error::CreateDir { .. } => ExitCode::from(73),
        Error::WriteConfig { .. } => ExitCode::from(74),
        Error::ReadConfig { .. } => ExitCode::from(74),
        Error::ParseConfig { .. } => ExitCode::from(65),
        Error::InvalidConfig { .. } => ExitCode::from(65),
        Error::ExplicitConfigMissing { .. } => ExitCode::from(66),
        Error::ConfigDiscoveryFailed { .. } => ExitCode::from(66),
        Error::SkipDiscoveryRequiresConfig { .. } => ExitCode::from(64),
        Error::WorkingDirectoryUnavailable { .. } => ExitCode::from(70),
        Error::StateDirUnavailable { .. } => ExitCode::from(73),
    }
}
