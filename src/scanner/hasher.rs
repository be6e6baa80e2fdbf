//! Streaming SHA-256 content fingerprints.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::errors::{ArsError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 digest of a file.
///
/// The file is read in fixed-size chunks, so memory use does not grow with
/// artifact size.
///
/// # Errors
/// Returns [`ArsError::Io`] if the file cannot be opened or read.
pub fn fingerprint(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| ArsError::io(path, source))?;
    fingerprint_reader(BufReader::with_capacity(CHUNK_SIZE, file))
        .map_err(|source| ArsError::io(path, source))
}

/// Digest any byte stream.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_digest_of_empty_input() {
        let digest = fingerprint_reader(&b""[..]).unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn known_digest_of_abc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.apk");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            fingerprint(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = fingerprint(Path::new("/nonexistent/app.apk")).unwrap_err();
        assert_eq!(err.code(), "ARS-3002");
    }

    #[test]
    fn multi_chunk_file_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.apk");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();
        assert_eq!(
            fingerprint(&path).unwrap(),
            fingerprint_reader(data.as_slice()).unwrap()
        );
    }

    proptest! {
        #[test]
        fn identical_bytes_give_identical_digest_regardless_of_name(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            name_a in "[a-z]{1,12}",
            name_b in "[a-z]{1,12}",
        ) {
            let dir = tempfile::tempdir().unwrap();
            let sub = dir.path().join("nested");
            std::fs::create_dir_all(&sub).unwrap();
            let a = dir.path().join(format!("{name_a}.apk"));
            let b = sub.join(format!("{name_b}.bin"));
            std::fs::write(&a, &data).unwrap();
            std::fs::write(&b, &data).unwrap();
            prop_assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        }
    }
}
