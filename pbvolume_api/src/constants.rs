use const_format::formatcp;

// Configuration constants

/// Default location of the driver configuration file.
pub const DRIVER_CONFIG_PATH_DEFAULT: &str = "/etc/pbvolume/config.yaml";

/// Root of all state the driver keeps on the host.
pub const DRIVER_STATE_DIR: &str = "/var/lib/pbvolume";

/// Default directory for per-volume metadata files.
pub const METADATA_PATH_DEFAULT: &str = formatcp!("{DRIVER_STATE_DIR}/metadata");

/// Default root under which volumes are mounted.
pub const MOUNT_PATH_DEFAULT: &str = formatcp!("{DRIVER_STATE_DIR}/mounts");

/// Default remote API endpoint.
pub const API_URL_DEFAULT: &str = "https://api.profitbricks.com/cloudapi/v4";

/// Default size of a new remote volume, in GB.
pub const VOLUME_SIZE_DEFAULT: u32 = 5;

/// Default storage class of a new remote volume.
pub const DISK_TYPE_DEFAULT: &str = "HDD";

/// Licence type reported for every remote volume.
pub const VOLUME_LICENCE_TYPE: &str = "OTHER";

/// Default filesystem created on freshly attached devices.
pub const FILESYSTEM_DEFAULT: &str = "ext4";

/// Kernel name of the instance's boot disk.
pub const BOOT_DEVICE_DEFAULT: &str = "vda";

/// Prefix of the remote display name of every volume created by the driver.
pub const REMOTE_NAME_PREFIX: &str = "docker-volume-profitbricks:";

/// Scope reported by the Capabilities call.
pub const CAPABILITY_SCOPE: &str = "profitbricks/docker-volume-profitbricks";

/// File holding the platform-provided instance identifier.
pub const PRODUCT_UUID_PATH: &str = "/sys/devices/virtual/dmi/id/product_uuid";

/// Environment variable consulted when the config carries no username.
pub const USERNAME_ENV_VAR: &str = "PROFITBRICKS_USERNAME";

/// Environment variable consulted when the config carries no password.
pub const PASSWORD_ENV_VAR: &str = "PROFITBRICKS_PASSWORD";

// Permissions

/// Mode of the metadata directory.
pub const METADATA_DIR_MODE: u32 = 0o700;

/// Mode of each per-volume metadata file.
pub const METADATA_FILE_MODE: u32 = 0o600;

// Timing policies

/// Seconds between two queries of an asynchronous remote request.
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Queries of an asynchronous remote request before giving up.
pub const POLL_MAX_ATTEMPTS: u32 = 50;

/// Seconds between two device snapshots while resolving an attached device.
pub const DEVICE_RESOLVE_INTERVAL_SECS: u64 = 3;

/// Device snapshots taken before giving up on resolving an attached device.
pub const DEVICE_RESOLVE_MAX_ATTEMPTS: u32 = 20;
