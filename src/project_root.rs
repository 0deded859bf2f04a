// expipe/src/project_root.rs

use std::path::{Path, PathBuf};

/// File whose presence marks a directory as a project root.
pub const MARKER_FILE: &str = "expipe.yaml";

/// Nearest ancestor of `start` (inclusive) that contains [`MARKER_FILE`].
///
/// The walk only ever climbs. It stops at the filesystem root, which
/// `Path::parent` reports correctly for both `/` and drive roots.
pub fn locate(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(MARKER_FILE).is_file())
        .map(Path::to_path_buf)
}
