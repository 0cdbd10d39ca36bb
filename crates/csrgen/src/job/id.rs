//! Job identifiers.

use std::fmt;

use super::JobError;

/// Symbols a job id is drawn from.
pub const ID_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// Length of every job id.
pub const ID_LEN: usize = 10;

/// Largest multiple of 62 that fits in a byte; bytes at or above it are
/// rejected so every symbol is equally likely.
const REJECTION_BOUND: u8 = 248;

/// A validated job id: exactly [`ID_LEN`] ASCII alphanumerics.
///
/// Ids double as folder and file names under the jobs directory, so anything
/// that does not parse is treated as a nonexistent job rather than touched on
/// disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == ID_LEN && value.bytes().all(|b| b.is_ascii_alphanumeric());
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of candidate job ids. The repository retries on collision, so an
/// implementation only has to be random, not unique.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Result<JobId, JobError>;
}

/// Draws ids from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> Result<JobId, JobError> {
        let mut id = String::with_capacity(ID_LEN);
        let mut bytes = [0u8; 2 * ID_LEN];

        while id.len() < ID_LEN {
            getrandom::fill(&mut bytes).map_err(|e| JobError::Entropy(e.to_string()))?;
            for byte in bytes {
                if byte >= REJECTION_BOUND {
                    continue;
                }
                id.push(ID_ALPHABET[usize::from(byte % 62)] as char);
                if id.len() == ID_LEN {
                    break;
                }
            }
        }

        Ok(JobId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_ids_have_expected_shape() {
        let generator = RandomIdGenerator;
        for _ in 0..200 {
            let id = generator.generate().unwrap();
            assert_eq!(id.as_str().len(), ID_LEN);
            assert!(id.as_str().bytes().all(|b| ID_ALPHABET.contains(&b)));
            assert_eq!(JobId::parse(id.as_str()), Some(id));
        }
    }

    #[test]
    fn test_random_ids_do_not_repeat() {
        let generator = RandomIdGenerator;
        let ids: HashSet<JobId> = (0..1000).map(|_| generator.generate().unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_alphabet_has_no_duplicates() {
        let unique: HashSet<u8> = ID_ALPHABET.iter().copied().collect();
        assert_eq!(unique.len(), 62);
        assert_eq!(usize::from(REJECTION_BOUND), 62 * 4);
    }

    #[test]
    fn test_parse_rejects_path_like_values() {
        assert!(JobId::parse("abcDEF1234").is_some());
        assert!(JobId::parse("abc123").is_none());
        assert!(JobId::parse("../../etc1").is_none());
        assert!(JobId::parse("abcdef123/").is_none());
        assert!(JobId::parse("abcdéf1234").is_none());
        assert!(JobId::parse("").is_none());
    }
}
