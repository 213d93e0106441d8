//! # Loadbench Synthetic Pools
//!
//! Fixed, ordered pools of synthetic values shared by every sender and
//! receiver task of a benchmark run:
//!
//! - **IdentityPool**: one unique identifier per simulated participant,
//!   sliced per shard so several harness instances can split one pool
//! - **KeyPool**: IPv4-shaped strings constrained to an [`AddressClass`],
//!   used as record filler and as content-addressed keys
//!
//! Both pools are initialized exactly once (first call wins) and are
//! read-only afterwards, so they can be shared behind an `Arc` without
//! further synchronization.
//!
//! ## Usage
//!
//! ```rust
//! use types::{AddressClass, IdentityPool, KeyPool, Shard};
//!
//! let identities = IdentityPool::new();
//! identities.init_generated(4).unwrap();
//! let (real_idx, _id) = identities.identity_at(1, Shard::new(0, 4)).unwrap();
//! assert_eq!(real_idx, 1);
//!
//! let keys = KeyPool::new();
//! keys.init_generated(16, AddressClass::Loopback).unwrap();
//! let key = keys.random_key().unwrap();
//! keys.validate(key).unwrap();
//! ```

pub mod error;
pub mod identity;
pub mod keys;
pub mod source;

pub use error::{PoolError, Result};
pub use identity::{IdentityPool, Shard};
pub use keys::{AddressClass, KeyPool};
pub use source::{read_lines, read_lines_from};
