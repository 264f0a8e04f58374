use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEFAULT_PREFERENCES_PATH: &str = "~/.config/certificate-claim/preferences.json";

/// Operator flag persisted between runs. Only verified operators see the
/// admin draw page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub is_verified: bool,
}

pub fn resolve_path(raw: Option<&str>) -> PathBuf {
    let raw = raw.unwrap_or(DEFAULT_PREFERENCES_PATH);
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl Preferences {
    /// A missing file reads as the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read(path)
            .wrap_err_with(|| format!("Failed to read preferences at {}", path.display()))?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(&data)
            .wrap_err_with(|| format!("Failed to parse preferences at {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create preferences directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_vec_pretty(self).wrap_err("Failed to serialize preferences")?;
        fs::write(path, json)
            .wrap_err_with(|| format!("Failed to write preferences to {}", path.display()))
    }
}
