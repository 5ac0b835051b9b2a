//! Counter descriptions for the catalog's recording sites
//!
//! Recording goes through the `metrics` facade and is a no-op until the host
//! installs a recorder.

use metrics::{describe_counter, Unit};

/// Describe every counter recorded by the lock, partition and router modules
pub fn init_metrics() {
    // Writer lock
    describe_counter!(
        "writer_lock.acquire.total",
        "Acquire attempts, labelled by outcome (fresh, stolen, contended)"
    );
    describe_counter!(
        "writer_lock.heartbeat.failed",
        "Heartbeats that found the lease gone or could not reach the store"
    );
    describe_counter!("writer_lock.release.total", "Leases released by their holder");
    describe_counter!(
        "writer_lock.force_clear.rows",
        Unit::Count,
        "Lock rows removed by administrative clears"
    );

    // Partition
    describe_counter!(
        "partition.rows_copied",
        Unit::Count,
        "Rows copied from the legacy store into area stores"
    );
    describe_counter!("partition.resync.failed", "Area stores whose resync rolled back");

    // Router
    describe_counter!(
        "router.denied",
        "Write operations refused, labelled by reason (read_only, scope)"
    );
}
