//! Mirroring of a batch of source files under a destination root
//!
//! Every source keeps its position relative to the longest directory prefix shared by the
//! whole batch:
//!
//! ```
//! use std::path::{Path, PathBuf};
//!
//! let sources = [PathBuf::from("/data/a/x.txt"), PathBuf::from("/data/b/y.txt")];
//! let base = common::path::common_base(&sources).unwrap();
//! assert_eq!(base, Path::new("/data"));
//! assert_eq!(
//!     common::path::mirror(&sources[1], &base, Path::new("/out")).unwrap(),
//!     Path::new("/out/b/y.txt")
//! );
//! ```

use anyhow::{anyhow, Context};

/// Longest directory prefix shared by all `paths`.
///
/// Only parent directories are compared so the base never ends with a file name, even for a
/// single path or a list of identical paths. A root (`/`) or a drive prefix is kept as a valid
/// standalone component.
pub fn common_base<P: AsRef<std::path::Path>>(paths: &[P]) -> anyhow::Result<std::path::PathBuf> {
    let mut iter = paths.iter().map(|path| {
        path.as_ref()
            .parent()
            .unwrap_or_else(|| std::path::Path::new(""))
    });
    let first = iter
        .next()
        .ok_or_else(|| anyhow!("cannot compute a common base of an empty path list"))?;
    let mut base: Vec<std::path::Component> = first.components().collect();
    for dir in iter {
        let shared = base
            .iter()
            .zip(dir.components())
            .take_while(|(lhs, rhs)| *lhs == rhs)
            .count();
        base.truncate(shared);
    }
    Ok(base.iter().collect())
}

/// Destination of `source` once mirrored from `base` to `root`.
pub fn mirror(
    source: &std::path::Path,
    base: &std::path::Path,
    root: &std::path::Path,
) -> anyhow::Result<std::path::PathBuf> {
    let relative = source
        .strip_prefix(base)
        .with_context(|| format!("{:?} is not located under {:?}", source, base))?;
    if relative.has_root() || relative.as_os_str().is_empty() {
        return Err(anyhow!(
            "cannot mirror {:?} from {:?}: mixed absolute and relative sources?",
            source,
            base
        ));
    }
    Ok(root.join(relative))
}
