use alloy_primitives::Address;
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};
use tracing::info;

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Sepolia,
    Holesky,
    Local,
}

impl DeploymentEnv {
    pub const ALL: [DeploymentEnv; 3] = [
        DeploymentEnv::Sepolia,
        DeploymentEnv::Holesky,
        DeploymentEnv::Local,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Sepolia => "sepolia",
            DeploymentEnv::Holesky => "holesky",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Sepolia => "Sepolia",
            DeploymentEnv::Holesky => "Holesky",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub contract_address: Address,
    pub chain_id: u64,
    pub network: String,
}

impl DeploymentRecord {
    pub fn new(env: DeploymentEnv, contract_address: Address, chain_id: u64) -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            contract_address,
            chain_id,
            network: env.dir_name().to_string(),
        }
    }
}

/// Append-only list of contract addresses known for one network.
#[derive(Debug)]
pub struct DeploymentStore {
    env: DeploymentEnv,
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::new_in(DEPLOYMENTS_ROOT, env)
    }

    pub fn new_in(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { env, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<DeploymentRecord>> {
        read_records(&self.path)
    }

    pub fn latest(&self) -> Result<Option<DeploymentRecord>> {
        Ok(self.load()?.pop())
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        write_records(&self.path, &records)
    }

    /// Picks the contract address to talk to. An explicit address wins and is
    /// recorded when it differs from the newest record; otherwise the newest
    /// record is used.
    pub fn resolve(&self, explicit: Option<Address>, chain_id: u64) -> Result<Option<Address>> {
        let latest = self.latest()?;
        match explicit {
            Some(address) => {
                if latest.as_ref().map(|r| r.contract_address) != Some(address) {
                    info!(%address, env = %self.env, "recording contract address");
                    self.append(DeploymentRecord::new(self.env, address, chain_id))?;
                }
                Ok(Some(address))
            }
            None => Ok(latest.map(|record| record.contract_address)),
        }
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in DeploymentEnv::ALL {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root)
            .wrap_err_with(|| format!("Failed to create {} directory", root.display()))?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).wrap_err_with(|| {
            format!("Failed to create {} directory", env_dir.display())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).wrap_err_with(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"[]").wrap_err_with(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).wrap_err("Failed to read deployment records")?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let records = serde_json::from_slice::<Vec<DeploymentRecord>>(&data)
        .wrap_err("Failed to parse deployment records JSON")?;
    Ok(records)
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .wrap_err("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).wrap_err("Failed to write deployment records")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn new_in__creates_empty_store() {
        // given
        let temp_dir = TempDir::new("deployments_empty").unwrap();

        // when
        let store = DeploymentStore::new_in(temp_dir.path(), DeploymentEnv::Sepolia).unwrap();

        // then
        assert!(store.path().ends_with("sepolia/deployments.json"));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn resolve__explicit_address_is_recorded_once() {
        // given
        let temp_dir = TempDir::new("deployments_explicit").unwrap();
        let store = DeploymentStore::new_in(temp_dir.path(), DeploymentEnv::Local).unwrap();
        let address = Address::repeat_byte(0x42);

        // when
        let first = store.resolve(Some(address), 31_337).unwrap();
        let second = store.resolve(Some(address), 31_337).unwrap();

        // then
        assert_eq!(first, Some(address));
        assert_eq!(second, Some(address));
        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].contract_address, address);
        assert_eq!(records[0].network, "local");
    }

    #[test]
    fn resolve__falls_back_to_newest_record() {
        // given
        let temp_dir = TempDir::new("deployments_newest").unwrap();
        let store = DeploymentStore::new_in(temp_dir.path(), DeploymentEnv::Holesky).unwrap();
        let old = Address::repeat_byte(1);
        let new = Address::repeat_byte(2);
        store.resolve(Some(old), 17_000).unwrap();
        store.resolve(Some(new), 17_000).unwrap();

        // when
        let resolved = store.resolve(None, 17_000).unwrap();

        // then
        assert_eq!(resolved, Some(new));
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn resolve__nothing_recorded_yields_none() {
        let temp_dir = TempDir::new("deployments_none").unwrap();
        let store = DeploymentStore::new_in(temp_dir.path(), DeploymentEnv::Sepolia).unwrap();

        assert_eq!(store.resolve(None, 11_155_111).unwrap(), None);
    }

    #[test]
    fn load__rejects_malformed_file() {
        let temp_dir = TempDir::new("deployments_malformed").unwrap();
        let store = DeploymentStore::new_in(temp_dir.path(), DeploymentEnv::Sepolia).unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        assert!(store.load().is_err());
    }
}
