//! Output file naming

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::config::CaptureConfig;
use crate::errors::RecorderError;

/// Render `pattern` at `at` and append the container extension
///
/// With the default pattern this yields `[DD-MM-YYYY] (HH-MM-SS).mp4`.
pub fn recording_file_name<Tz>(at: &DateTime<Tz>, pattern: &str, extension: &str) -> Result<String, RecorderError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut name = String::new();
    write!(name, "{}", at.format(pattern))
        .map_err(|_| RecorderError::Config(format!("Invalid filename pattern {:?}", pattern)))?;
    name.push('.');
    name.push_str(extension);
    Ok(name)
}

/// Full output path inside `folder` for a recording started at `at`
pub fn recording_path<Tz>(folder: &Path, at: &DateTime<Tz>, capture: &CaptureConfig) -> Result<PathBuf, RecorderError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let name = recording_file_name(at, &capture.filename_pattern, &capture.container_extension)?;
    Ok(folder.join(name))
}
