use std::{
    fs::{File, Permissions},
    io::{ErrorKind, Write},
    os::unix::fs::PermissionsExt,
    path::Path,
};

use anyhow::{Context, Error};

/// Creates all directories in a path if they don't exist
pub fn create_dirs<S>(path: S) -> Result<(), Error>
where
    S: AsRef<Path>,
{
    std::fs::create_dir_all(path.as_ref()).context(format!(
        "Could not create path: {}",
        path.as_ref().display()
    ))
}

/// Creates all directories in a path if they don't exist, and sets the mode
/// of the last one
pub fn create_dirs_mode<S>(path: S, mode: u32) -> Result<(), Error>
where
    S: AsRef<Path>,
{
    create_dirs(path.as_ref())?;
    std::fs::set_permissions(path.as_ref(), Permissions::from_mode(mode)).context(format!(
        "Could not set permissions {:#o} for directory {}",
        mode,
        path.as_ref().display()
    ))
}

/// Writes to a file, creating it and its parents as needed, and sets the file mode
pub fn write_file<S>(path: S, mode: u32, contents: &[u8]) -> Result<(), Error>
where
    S: AsRef<Path>,
{
    if let Some(parent) = path.as_ref().parent() {
        create_dirs(parent)?;
    }

    let mut file = File::create(path.as_ref()).context(format!(
        "Could not create file: {}",
        path.as_ref().display()
    ))?;
    std::fs::set_permissions(path.as_ref(), Permissions::from_mode(mode)).context(format!(
        "Could not set permissions {:#o} for file {}",
        mode,
        path.as_ref().display()
    ))?;

    file.write_all(contents).context(format!(
        "Could not write to file: {}",
        path.as_ref().display()
    ))
}

/// Reads the content of a file and trims it
pub fn read_file_trim<S>(file_path: &S) -> Result<String, Error>
where
    S: AsRef<Path>,
{
    let content = std::fs::read_to_string(file_path.as_ref()).context(format!(
        "Could not read file contents: {:?}",
        file_path.as_ref()
    ))?;
    Ok(content.trim().to_string())
}

/// Removes a file. A file that is already gone is not an error.
pub fn remove_file_if_exists<S>(path: S) -> Result<(), Error>
where
    S: AsRef<Path>,
{
    match std::fs::remove_file(path.as_ref()) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        res => res.context(format!(
            "Could not remove file: {}",
            path.as_ref().display()
        )),
    }
}
