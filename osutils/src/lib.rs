pub mod dmi;
pub mod exe;
pub mod files;
pub mod lsblk;
pub mod mkfs;
pub mod mount;

pub(crate) mod crate_private {
    pub trait Sealed {}
}
