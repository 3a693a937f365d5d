use bytes::Bytes;
use rand::RngCore as _;

use crate::config::MIB;
use crate::error::StepError;

/// Random upload body plus the facts needed to verify it later.
#[derive(Debug, Clone)]
pub struct Payload {
    pub data: Bytes,
    pub md5: [u8; 16],
}

impl Payload {
    /// `size` random bytes. CPU-bound for large sizes: call from a blocking task.
    #[must_use]
    pub fn random(size: u64) -> Self {
        let mut buf = vec![0u8; usize::try_from(size).unwrap_or(usize::MAX)];
        rand::thread_rng().fill_bytes(&mut buf);
        let md5 = digest(&buf);
        Self {
            data: Bytes::from(buf),
            md5,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// What verification needs once the bytes themselves are gone.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            len: self.len(),
            md5: self.md5,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duration (whole seconds) the service expects with an audio upload: 30 MiB ~ 200 s.
    #[must_use]
    pub fn estimated_duration_secs(&self) -> u64 {
        estimated_duration_secs(self.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub md5: [u8; 16],
}

#[must_use]
pub fn estimated_duration_secs(size: u64) -> u64 {
    (size as f64 / (30 * MIB) as f64 * 200.0) as u64
}

#[must_use]
pub fn digest(data: &[u8]) -> [u8; 16] {
    md5::compute(data).0
}

#[must_use]
pub fn hex(digest: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        write!(out, "{b:02x}").ok();
    }
    out
}

/// Compare a downloaded body with the fingerprint of the original payload.
///
/// Length is checked first, so a truncated download is rejected without hashing. The
/// content hash is only compared for payloads below `hash_ceiling`.
pub fn verify_payload(
    expected: &Fingerprint,
    downloaded: &[u8],
    hash_ceiling: u64,
) -> Result<(), StepError> {
    let got = downloaded.len() as u64;
    if got != expected.len {
        return Err(StepError::Integrity(format!(
            "size mismatch: expected {} bytes, got {got}",
            expected.len
        )));
    }

    if expected.len < hash_ceiling {
        let actual = digest(downloaded);
        if actual != expected.md5 {
            return Err(StepError::Integrity(format!(
                "md5 mismatch: expected {}, got {}",
                hex(&expected.md5),
                hex(&actual)
            )));
        }
    }
    Ok(())
}
