use std::path::Path;

/// Compute a SHA256 over all regular files found below `paths`.
///
/// Every file is hashed on its own, the hex digests are sorted and concatenated,
/// and the result is hashed once more. The outcome does not depend on the order
/// of `paths` or on directory traversal order.
pub fn hash_paths<P: AsRef<Path>>(paths: &[P]) -> std::io::Result<String> {
    let mut digests = Vec::new();
    for path in paths {
        collect(path.as_ref(), &mut digests)?;
    }
    digests.sort();
    Ok(sha256::digest(digests.concat()))
}

fn collect(path: &Path, digests: &mut Vec<String>) -> std::io::Result<()> {
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            collect(&entry?.path(), digests)?;
        }
    } else {
        digests.push(sha256::digest(std::fs::read(path)?.as_slice()));
    }
    Ok(())
}

/// Short form of a digest, suitable as an image tag.
pub fn short(digest: &str) -> &str {
    const TAG_LENGTH: usize = 12;
    digest.get(..TAG_LENGTH).unwrap_or(digest)
}
