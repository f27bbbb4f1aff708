use std::path::Path;

use anyhow::{ensure, Context, Error};

use crate::files;

/// Reads the platform-provided instance identifier (the DMI product UUID)
/// and normalizes it to lower case.
pub fn product_uuid(path: impl AsRef<Path>) -> Result<String, Error> {
    let uuid = files::read_file_trim(&path.as_ref())
        .context("Failed to read DMI product UUID")?
        .to_lowercase();
    ensure!(
        !uuid.is_empty(),
        "DMI product UUID at {} is empty",
        path.as_ref().display()
    );
    Ok(uuid)
}
