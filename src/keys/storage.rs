//! Reading and writing key files.
//!
//! Secret material (private keys, shared secrets) is only read from files
//! that are not accessible to group or other users, and is always written
//! with mode 0600.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{ApiSecurityError, ApiSecurityResult, KeyErrorKind};

/// Read a secret from a file with restrictive permissions.
pub(crate) fn read_secret_file(path: &Path) -> ApiSecurityResult<Vec<u8>> {
    let metadata = std::fs::metadata(path).map_err(|e| read_error(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        // Group and world bits must all be zero
        if mode & 0o077 != 0 {
            return Err(ApiSecurityError::key(KeyErrorKind::InsecurePermissions {
                path: path.to_path_buf(),
                mode: mode & 0o777,
            }));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    std::fs::read(path).map_err(|e| read_error(path, e))
}

/// Read a public (non-secret) key file.
pub(crate) fn read_public_file(path: &Path) -> ApiSecurityResult<String> {
    std::fs::read_to_string(path).map_err(|e| read_error(path, e))
}

/// Write a secret to a file readable and writable by the owner only.
pub(crate) fn write_secret_file(path: &Path, contents: &[u8]) -> ApiSecurityResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;

    // An existing file keeps its old mode through open(), so reset it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    debug!(path = %path.display(), "Secret key file written");
    Ok(())
}

/// Write a public key file.
pub(crate) fn write_public_file(path: &Path, contents: &[u8]) -> ApiSecurityResult<()> {
    std::fs::write(path, contents)?;
    debug!(path = %path.display(), "Public key file written");
    Ok(())
}

fn read_error(path: &Path, e: std::io::Error) -> ApiSecurityError {
    ApiSecurityError::key(KeyErrorKind::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
