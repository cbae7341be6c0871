//! Kernel log sink
//!
//! Bring-up milestones are also written to the kernel ring buffer so they
//! show up next to driver messages. Writing is best effort: a missing or
//! unwritable `/dev/kmsg` is ignored.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

pub const KMSG_PATH: &str = "/dev/kmsg";

/// Tag prefixed to every message
pub const KLOG_TAG: &str = "arista";

/// syslog level used by [`klog`] (LOG_CRIT, always shown on the console)
pub const DEFAULT_LEVEL: u8 = 2;

/// Write `msg` to the kernel log, ignoring failures
pub fn klog(msg: &str) {
    klog_to(Path::new(KMSG_PATH), DEFAULT_LEVEL, msg);
}

/// Write `msg` to a kmsg-style sink at `path`, ignoring failures
pub fn klog_to(path: &Path, level: u8, msg: &str) {
    if let Err(e) = write_record(path, level, msg) {
        log::trace!("klog to {} dropped: {}", path.display(), e);
    }
}

fn write_record(path: &Path, level: u8, msg: &str) -> io::Result<()> {
    let mut sink = OpenOptions::new().write(true).open(path)?;
    sink.write_all(format!("<{}>{}: {}\n", level, KLOG_TAG, msg).as_bytes())
}
