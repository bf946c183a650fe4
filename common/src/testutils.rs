pub const X_SIZE: u64 = 1024;
pub const Y_SIZE: u64 = 64 * 1024;
pub const Z_SIZE: u64 = 10;

fn contents(size: u64, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
}

pub fn setup_test_dir() -> anyhow::Result<tempfile::TempDir> {
    let tmp_dir = tempfile::Builder::new().prefix("rcopier_test").tempdir()?;
    // src
    // |- a
    //    |- x.txt (1 KiB)
    // |- b
    //    |- y.txt (64 KiB)
    //    |- z.txt (10 bytes)
    // dst
    let src_path = tmp_dir.path().join("src");
    let a_path = src_path.join("a");
    std::fs::create_dir_all(&a_path)?;
    std::fs::write(a_path.join("x.txt"), contents(X_SIZE, 1))?;
    let b_path = src_path.join("b");
    std::fs::create_dir_all(&b_path)?;
    std::fs::write(b_path.join("y.txt"), contents(Y_SIZE, 2))?;
    std::fs::write(b_path.join("z.txt"), contents(Z_SIZE, 3))?;
    std::fs::create_dir(tmp_dir.path().join("dst"))?;
    Ok(tmp_dir)
}

fn shift_mtime(
    path: &std::path::Path,
    reference: &std::path::Path,
    offset_secs: i64,
) -> anyhow::Result<()> {
    let reference = filetime::FileTime::from_last_modification_time(&std::fs::metadata(reference)?);
    let mtime = filetime::FileTime::from_unix_time(
        reference.unix_seconds() + offset_secs,
        reference.nanoseconds(),
    );
    filetime::set_file_mtime(path, mtime)?;
    Ok(())
}

/// Makes `path` look modified well after `reference`.
pub fn make_newer(path: &std::path::Path, reference: &std::path::Path) -> anyhow::Result<()> {
    shift_mtime(path, reference, 60)
}

pub fn make_older(path: &std::path::Path, reference: &std::path::Path) -> anyhow::Result<()> {
    shift_mtime(path, reference, -60)
}
