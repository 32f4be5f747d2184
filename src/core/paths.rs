use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base docval config directory (~/.config/docval/ on all platforms)
pub fn docval() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("docval"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("docval"))
    }
}

/// Global docval.json config file path
pub fn docval_json() -> Result<PathBuf> {
    Ok(docval()?.join("docval.json"))
}
