//! Central defaults shared by the CLI surface and the phase orchestrators.

/// Where cephfs is mounted on every node.
pub fn mountpoint_path() -> &'static str {
    "/mnt/cephfs"
}

/// Retry budget for operations that depend on monitor quorum settling.
pub fn retries() -> u32 {
    10
}

/// Op threads per OSD daemon.
pub fn osd_op_threads() -> u32 {
    4
}

/// Pool replication size.
pub fn osd_pool_size() -> u32 {
    3
}

/// Maximum object size in bytes (128 MiB).
pub fn osd_max_obj_size() -> u64 {
    128 * 1024 * 1024
}

/// RAM backing per memstore OSD, in bytes (10 GiB).
pub fn memstore_storage_size() -> u64 {
    10 * 1024 * 1024 * 1024
}

/// Remote directory (relative to the remote home) for tooling checkouts.
pub fn install_dir() -> &'static str {
    "deps"
}

/// Compile parallelism for the connector library build.
pub fn compile_cores() -> u32 {
    16
}

/// Stripe size for staged data files, in bytes (64 MiB).
pub fn stripe_size() -> u64 {
    64 * 1024 * 1024
}
