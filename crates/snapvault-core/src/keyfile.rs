//! Master key files: 32 bytes, hex encoded, surrounding whitespace ignored

use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::Path;

use snapvault_crypto::MasterKey;

use crate::error::{SnapvaultError, SnapvaultResult};

pub fn load_master_key(path: &Path) -> SnapvaultResult<MasterKey> {
    let content = std::fs::read_to_string(path)
        .map(SecretString::from)
        .map_err(|e| {
            SnapvaultError::Config(format!("reading master key file {}: {e}", path.display()))
        })?;

    Ok(MasterKey::from_hex(content.expose_secret())?)
}

/// Write `key` to a new file, readable by the owner only. Refuses to overwrite.
pub fn write_master_key(path: &Path, key: &MasterKey) -> SnapvaultResult<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    writeln!(file, "{}", key.to_hex().expose_secret())?;
    file.sync_all()?;
    Ok(())
}
