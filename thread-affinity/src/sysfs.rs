//! Single-value reads from sysfs/procfs attribute files.

use {
    log::debug,
    std::{
        fs::File,
        io::{BufRead, BufReader, Read},
        path::Path,
        str::FromStr,
    },
};

/// Upper bound on how much of an attribute line is read.
pub const MAX_ATTRIBUTE_LEN: u64 = 10240;

/// Reads the first line of the attribute file at `path`.
///
/// Returns `None` if the file is missing or unreadable. The trailing newline,
/// if any, is stripped; anything past [`MAX_ATTRIBUTE_LEN`] bytes is ignored.
pub fn read_attribute(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            debug!("attribute {} unavailable: {err}", path.display());
            return None;
        }
    };

    let mut reader = BufReader::new(file.take(MAX_ATTRIBUTE_LEN));
    let mut bytes = Vec::new();
    if let Err(err) = reader.read_until(b'\n', &mut bytes) {
        debug!("failed to read attribute {}: {err}", path.display());
        return None;
    }
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads and parses a numeric attribute, falling back to the default value
/// (zero for integers) when the file is missing or does not hold a number.
pub fn read_numeric_attribute<T>(path: impl AsRef<Path>) -> T
where
    T: FromStr + Default,
{
    let path = path.as_ref();
    match read_attribute(path) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            debug!(
                "attribute {} is not numeric: {:?}, using default",
                path.display(),
                value
            );
            T::default()
        }),
        None => T::default(),
    }
}
