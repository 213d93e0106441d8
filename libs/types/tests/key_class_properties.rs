//! Property tests for the address-class predicates
//!
//! Every class check must agree with a plain reading of the octet rules for
//! arbitrary dotted quads, and every generated key must pass its own class.

use proptest::prelude::*;
use types::{AddressClass, KeyPool};

fn expected(class: AddressClass, first: u8) -> bool {
    match class {
        AddressClass::Any => first != 0,
        AddressClass::A => (1..=126).contains(&first) && first != 10,
        AddressClass::APrivate => first == 10,
        AddressClass::Loopback => first == 127,
    }
}

proptest! {
    #[test]
    fn class_validation_matches_octet_rules(a: u8, b: u8, c: u8, d: u8) {
        let key = format!("{}.{}.{}.{}", a, b, c, d);
        for class in AddressClass::ALL {
            prop_assert_eq!(class.validate(&key).is_ok(), expected(class, a));
        }
    }

    #[test]
    fn out_of_range_octets_never_validate(a in 256u32..1000, b: u8) {
        let key = format!("{}.{}.0.1", a, b);
        for class in AddressClass::ALL {
            prop_assert!(class.validate(&key).is_err());
        }
    }
}

#[test]
fn test_generated_pools_validate_for_every_class() {
    for class in AddressClass::ALL {
        let pool = KeyPool::new();
        pool.init_generated(1000, class).unwrap();
        assert_eq!(pool.count(), 1000);

        for key in pool.keys() {
            pool.validate(key)
                .unwrap_or_else(|e| panic!("class {}: {}", class, e));
        }
    }
}

#[test]
fn test_class_a_never_yields_private_or_zero() {
    let pool = KeyPool::new();
    pool.init_generated(5000, AddressClass::A).unwrap();

    for key in pool.keys() {
        let first: u8 = key.split('.').next().unwrap().parse().unwrap();
        assert!(first != 0 && first != 10 && first <= 126, "bad key {}", key);
    }
}
