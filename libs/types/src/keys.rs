//! IPv4-shaped key pool
//!
//! Keys look like dotted-quad addresses and are constrained to one of four
//! address classes. They serve as record filler on pub/sub backends and as
//! the content-addressed key on key/value backends.
//!
//! ## Generation
//!
//! The first octet is either fixed (A-Private, Loopback) or sampled with an
//! exclusion list (Any excludes 0, A excludes 0 and 10). A sample that hits
//! the exclusion list is NOT resampled: the generator scans forward from the
//! class minimum to the first allowed value. That skews the distribution
//! toward low first octets and existing pool files depend on it, so keep the
//! scan.

use crate::{PoolError, Result};
use once_cell::sync::OnceCell;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

const MIN_OCTET: u8 = 0;
const MAX_OCTET: u8 = 255;
const CLASS_A_MAX_OCTET: u8 = 126;
const CLASS_A_PRIVATE_FIRST_OCTET: u8 = 10;
const LOOPBACK_FIRST_OCTET: u8 = 127;

/// Constraint family for generated keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressClass {
    /// First octet in [1, 255]
    #[default]
    Any,
    /// First octet in [1, 126], excluding 10
    A,
    /// First octet fixed to 10
    #[serde(rename = "a-private")]
    APrivate,
    /// First octet fixed to 127
    Loopback,
}

impl AddressClass {
    pub const ALL: [AddressClass; 4] = [
        AddressClass::Any,
        AddressClass::A,
        AddressClass::APrivate,
        AddressClass::Loopback,
    ];

    /// Generate one key of this class
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let first = match self {
            AddressClass::Any => octet_excluding(rng, MIN_OCTET, MAX_OCTET, &[MIN_OCTET]),
            AddressClass::A => octet_excluding(
                rng,
                MIN_OCTET,
                CLASS_A_MAX_OCTET,
                &[MIN_OCTET, CLASS_A_PRIVATE_FIRST_OCTET],
            ),
            AddressClass::APrivate => CLASS_A_PRIVATE_FIRST_OCTET,
            AddressClass::Loopback => LOOPBACK_FIRST_OCTET,
        };

        let mut octets = [first, 0, 0, 0];
        for octet in octets.iter_mut().skip(1) {
            *octet = octet_excluding(rng, MIN_OCTET, MAX_OCTET, &[]);
        }

        Ipv4Addr::from(octets).to_string()
    }

    /// Check `key` against this class, naming the violated rule on failure
    pub fn validate(&self, key: &str) -> Result<()> {
        let addr = Ipv4Addr::from_str(key)
            .map_err(|_| PoolError::validation(key, "not a dotted-quad of octets in [0,255]"))?;
        let first = addr.octets()[0];

        let rule = match self {
            AddressClass::Any if first == MIN_OCTET => "not class Any: first octet is 0",
            AddressClass::A
                if first == MIN_OCTET
                    || first > CLASS_A_MAX_OCTET
                    || first == CLASS_A_PRIVATE_FIRST_OCTET =>
            {
                "not class A: first octet out of [1,126] or equals 10"
            }
            AddressClass::APrivate if first != CLASS_A_PRIVATE_FIRST_OCTET => {
                "not class A-Private: first octet is not 10"
            }
            AddressClass::Loopback if first != LOOPBACK_FIRST_OCTET => {
                "not class Loopback: first octet is not 127"
            }
            _ => return Ok(()),
        };

        Err(PoolError::validation(key, rule))
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressClass::Any => "any",
            AddressClass::A => "a",
            AddressClass::APrivate => "a-private",
            AddressClass::Loopback => "loopback",
        };
        f.write_str(name)
    }
}

impl FromStr for AddressClass {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(AddressClass::Any),
            "a" => Ok(AddressClass::A),
            "a-private" | "a_private" | "aprivate" => Ok(AddressClass::APrivate),
            "loopback" => Ok(AddressClass::Loopback),
            other => Err(PoolError::invalid_argument(format!(
                "invalid address class {}",
                other
            ))),
        }
    }
}

/// Sample an octet in [min, max], avoiding `exclude` by linear scan
fn octet_excluding<R: Rng + ?Sized>(rng: &mut R, min: u8, max: u8, exclude: &[u8]) -> u8 {
    let mut octet = rng.gen_range(0..=max);
    if octet < min && max > min {
        octet = octet.saturating_add(rng.gen_range(0..max - min));
    }

    if exclude.contains(&octet) {
        if let Some(allowed) = (min..=max).find(|candidate| !exclude.contains(candidate)) {
            octet = allowed;
        }
    }

    octet
}

#[derive(Debug)]
struct KeyBlock {
    keys: Vec<String>,
    class: AddressClass,
}

/// Fixed set of class-constrained keys
#[derive(Debug, Default)]
pub struct KeyPool {
    block: OnceCell<KeyBlock>,
}

impl KeyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt `keys` verbatim as class [`AddressClass::Any`]; no-op if initialized
    pub fn init_from_list(&self, keys: Vec<String>) -> Result<()> {
        self.block
            .get_or_try_init(|| {
                if keys.is_empty() {
                    return Err(PoolError::invalid_argument("key list is empty"));
                }
                info!("Key pool initialized from list ({} keys)", keys.len());
                Ok(KeyBlock {
                    keys,
                    class: AddressClass::Any,
                })
            })
            .map(|_| ())
    }

    /// Adopt the non-blank lines of `reader`
    pub fn init_from_reader<R: BufRead>(&self, reader: R) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.init_from_list(crate::read_lines_from(reader)?)
    }

    /// Adopt the non-blank lines of the file at `path`
    pub fn init_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.init_from_list(crate::read_lines(path)?)
    }

    /// Generate `count` keys of `class`; no-op if initialized
    pub fn init_generated(&self, count: usize, class: AddressClass) -> Result<()> {
        self.block
            .get_or_try_init(|| {
                if count == 0 {
                    return Err(PoolError::invalid_argument("key count is 0"));
                }

                let mut rng = rand::thread_rng();
                let keys = (0..count).map(|_| class.generate(&mut rng)).collect();

                info!("Key pool generated ({} keys, class {})", count, class);
                Ok(KeyBlock { keys, class })
            })
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.block.get().is_some()
    }

    pub fn count(&self) -> usize {
        self.block.get().map_or(0, |b| b.keys.len())
    }

    /// Class the pool was generated for ([`AddressClass::Any`] for loaded pools)
    pub fn class(&self) -> Option<AddressClass> {
        self.block.get().map(|b| b.class)
    }

    pub fn keys(&self) -> &[String] {
        self.block.get().map_or(&[], |b| b.keys.as_slice())
    }

    /// Uniformly random pool entry
    pub fn random_key(&self) -> Result<&str> {
        let block = self
            .block
            .get()
            .ok_or(PoolError::NotInitialized { pool: "key" })?;
        let idx = rand::thread_rng().gen_range(0..block.keys.len());
        Ok(block.keys[idx].as_str())
    }

    /// Validate `key` against the pool's class
    pub fn validate(&self, key: &str) -> Result<()> {
        let block = self
            .block
            .get()
            .ok_or(PoolError::NotInitialized { pool: "key" })?;
        block.class.validate(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_keys_satisfy_their_class() {
        let mut rng = StdRng::seed_from_u64(7);
        for class in AddressClass::ALL {
            for _ in 0..1000 {
                let key = class.generate(&mut rng);
                assert!(class.validate(&key).is_ok(), "{} failed {}", key, class);
            }
        }
    }

    #[test]
    fn test_crafted_keys_fail_their_class() {
        assert!(AddressClass::Any.validate("0.1.2.3").is_err());
        assert!(AddressClass::A.validate("10.0.0.1").is_err());
        assert!(AddressClass::A.validate("127.0.0.1").is_err());
        assert!(AddressClass::APrivate.validate("11.0.0.1").is_err());
        assert!(AddressClass::Loopback.validate("10.0.0.1").is_err());
        assert!(AddressClass::Any.validate("256.1.1.1").is_err());
        assert!(AddressClass::Any.validate("1.2.3").is_err());
    }

    #[test]
    fn test_validation_error_names_rule() {
        let err = AddressClass::A.validate("10.0.0.1").unwrap_err();
        assert!(err.to_string().contains("first octet out of [1,126] or equals 10"));
    }

    #[test]
    fn test_excluded_sample_scans_from_minimum() {
        struct Fixed(u64);
        impl rand::RngCore for Fixed {
            fn next_u32(&mut self) -> u32 {
                self.0 as u32
            }
            fn next_u64(&mut self) -> u64 {
                self.0
            }
            fn fill_bytes(&mut self, dest: &mut [u8]) {
                dest.fill(0)
            }
            fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
                dest.fill(0);
                Ok(())
            }
        }

        // A zero-valued generator always samples 0, the excluded minimum
        let mut rng = Fixed(0);
        assert_eq!(octet_excluding(&mut rng, 0, 255, &[0]), 1);
        assert_eq!(octet_excluding(&mut rng, 0, 126, &[0, 1, 10]), 2);
        assert_eq!(octet_excluding(&mut rng, 0, 255, &[]), 0);
    }

    #[test]
    fn test_pool_random_key_requires_init() {
        let pool = KeyPool::new();
        assert!(matches!(
            pool.random_key(),
            Err(PoolError::NotInitialized { .. })
        ));

        pool.init_generated(8, AddressClass::APrivate).unwrap();
        let key = pool.random_key().unwrap();
        assert!(key.starts_with("10."));
        assert_eq!(pool.class(), Some(AddressClass::APrivate));
    }

    #[test]
    fn test_loaded_pool_is_class_any() {
        let pool = KeyPool::new();
        pool.init_from_list(vec!["10.0.0.1".into(), "10.0.0.2".into()])
            .unwrap();
        pool.init_generated(32, AddressClass::Loopback).unwrap();

        assert_eq!(pool.count(), 2);
        assert_eq!(pool.class(), Some(AddressClass::Any));
    }

    #[test]
    fn test_class_parsing() {
        assert_eq!("A-Private".parse::<AddressClass>().unwrap(), AddressClass::APrivate);
        assert_eq!("loopback".parse::<AddressClass>().unwrap(), AddressClass::Loopback);
        assert!(matches!(
            "class-b".parse::<AddressClass>(),
            Err(PoolError::InvalidArgument(_))
        ));
    }
}
