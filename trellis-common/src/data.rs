// Copyright 2019 The Druid Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Traits for handling value types.
//!
//! `Data` is the cheap "has this value changed" test used by signals to skip redundant
//! notifications.

use std::{collections::BTreeMap, rc::Rc};

pub trait Data: Clone + 'static {
    fn same(&self, other: &Self) -> bool;
}

/// An impl of `Data` suitable for simple types.
///
/// The `same` method is implemented with equality, so the type should
/// implement `Eq` at least.
macro_rules! impl_data_simple {
    ($t:ty) => {
        impl Data for $t {
            fn same(&self, other: &Self) -> bool {
                self == other
            }
        }
    };
}

impl_data_simple!(bool);
impl_data_simple!(String);

impl<T: ?Sized + 'static> Data for Rc<T> {
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: Data> Data for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

// Ordered maps compare entry-wise; both sides iterate in key order.
impl<K: Ord + Clone + 'static, V: Data> Data for BTreeMap<K, V> {
    fn same(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.same(vb))
    }
}

#[cfg(test)]
mod tests {
    use super::Data;
    use std::{collections::BTreeMap, rc::Rc};

    #[test]
    fn options_and_strings() {
        assert!(Some("a".to_string()).same(&Some("a".to_string())));
        assert!(!Some("a".to_string()).same(&None));
        assert!(None::<String>.same(&None));
    }

    #[test]
    fn rc_uses_identity() {
        let a = Rc::new(1);
        let b = Rc::new(1);
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }

    #[test]
    fn maps_compare_entries() {
        let mut a = BTreeMap::new();
        a.insert("Locals".to_string(), true);
        let mut b = a.clone();
        assert!(a.same(&b));
        b.insert("Locals".to_string(), false);
        assert!(!a.same(&b));
    }
}
