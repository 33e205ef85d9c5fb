//! List model
//!
//! A [`ListValue`] is an ordered sequence of element values indexed by each
//! element's natural key. Keys are unique: writing a value whose key is
//! already present updates the existing element in place.
//!
//! Every write validates the whole batch before touching the list, so a
//! rejected call leaves the list unchanged.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::class::{Type, TypeKind};
use crate::error::{KilnError, KilnResult};
use crate::value::{generate_instance_uid, Value};

/// Flags for [`ListValue::set`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Do not append values that are not in the list yet
    pub no_add: bool,
    /// Do not update elements whose key is already present
    pub no_update: bool,
    /// Do not remove elements missing from the new values
    pub no_remove: bool,
}

struct ListInner {
    uid: u64,
    ty: Type,
    elements: RwLock<IndexMap<String, Value>>,
}

/// Keyed, ordered list of element values
#[derive(Clone)]
pub struct ListValue(Arc<ListInner>);

impl ListValue {
    /// Create an empty list of the given list type
    pub fn new(ty: Type) -> Self {
        ListValue(Arc::new(ListInner {
            uid: generate_instance_uid(),
            ty,
            elements: RwLock::new(IndexMap::new()),
        }))
    }

    /// Instance uid
    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    /// List type
    pub fn list_type(&self) -> &Type {
        &self.0.ty
    }

    /// Element type, when the list type declares one
    pub fn element_type(&self) -> Option<Type> {
        self.0.ty.element_type()
    }

    /// Identity comparison
    pub fn same(&self, other: &ListValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Drop nulls, check element types and de-duplicate by key (first wins)
    fn prepare<I, V>(&self, values: I) -> KilnResult<Vec<(String, Value)>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<Value>>,
    {
        let element_type = self.element_type();
        let mut seen = FxHashSet::default();
        let mut batch = Vec::new();

        for value in values.into_iter().filter_map(Into::into) {
            let fits = match &element_type {
                Some(element) => value.value_type().is_subtype_of(element),
                None => value.value_type().kind() != TypeKind::List,
            };
            if !fits {
                return Err(KilnError::invalid(
                    "values",
                    format!(
                        "value of type '{}' cannot be an element of list type '{}'",
                        value.value_type(),
                        self.0.ty
                    ),
                ));
            }
            let key = value.key();
            if seen.insert(key.clone()) {
                batch.push((key, value));
            }
        }
        Ok(batch)
    }

    /// Append values; present keys update the existing element in place
    pub fn add<I, V>(&self, values: I) -> KilnResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<Value>>,
    {
        let batch = self.prepare(values)?;
        let mut elements = self.0.elements.write();
        for (key, value) in batch {
            match elements.get(&key) {
                Some(existing) => existing.update_from(&value),
                None => {
                    elements.insert(key, value);
                }
            }
        }
        Ok(())
    }

    /// Insert values at `index`.
    ///
    /// A negative index counts from the end and clamps to 0; an index at or
    /// past the end appends. Present keys update in place.
    pub fn insert<I, V>(&self, values: I, index: isize) -> KilnResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<Value>>,
    {
        let batch = self.prepare(values)?;
        let mut elements = self.0.elements.write();
        let mut position = normalize_index(index, elements.len()).min(elements.len());
        for (key, value) in batch {
            match elements.get(&key) {
                Some(existing) => existing.update_from(&value),
                None => {
                    elements.shift_insert(position, key, value);
                    position += 1;
                }
            }
        }
        Ok(())
    }

    /// Remove elements by identity; an equal-keyed stranger is ignored
    pub fn remove<I, V>(&self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<Value>>,
    {
        let mut elements = self.0.elements.write();
        for value in values.into_iter().filter_map(Into::into) {
            let key = value.key();
            if elements.get(&key).is_some_and(|existing| existing.same(&value)) {
                elements.shift_remove(&key);
            }
        }
    }

    /// Remove `count` elements starting at `start` and return them.
    ///
    /// A negative start counts from the end. Out-of-range starts and
    /// non-positive counts remove nothing.
    pub fn remove_at(&self, start: isize, count: isize) -> Vec<Value> {
        let mut elements = self.0.elements.write();
        let len = elements.len();
        if count <= 0 || len == 0 {
            return Vec::new();
        }
        let start = normalize_index(start, len);
        if start >= len {
            return Vec::new();
        }
        let end = start.saturating_add(count as usize).min(len);
        elements.drain(start..end).map(|(_, v)| v).collect()
    }

    /// Reconcile the list with `values`.
    ///
    /// Elements whose key is still present are updated, new keys are
    /// appended and missing keys removed, each unless suppressed by
    /// `options`. Surviving elements keep their relative order.
    pub fn set<I, V>(&self, values: I, options: SetOptions) -> KilnResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Option<Value>>,
    {
        let batch = self.prepare(values)?;
        let mut elements = self.0.elements.write();

        if !options.no_remove {
            let keep: FxHashSet<String> = batch.iter().map(|(k, _)| k.clone()).collect();
            elements.retain(|key, _| keep.contains(key));
        }

        for (key, value) in batch {
            match elements.get(&key) {
                Some(existing) => {
                    if !options.no_update {
                        existing.update_from(&value);
                    }
                }
                None => {
                    if !options.no_add {
                        elements.insert(key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove every element
    pub fn clear(&self) {
        self.0.elements.write().clear();
    }

    /// Copy of the elements in order
    pub fn to_array(&self) -> Vec<Value> {
        self.0.elements.read().values().cloned().collect()
    }

    /// Number of elements
    pub fn count(&self) -> usize {
        self.0.elements.read().len()
    }

    /// Element at a position
    pub fn at(&self, index: usize) -> Option<Value> {
        self.0
            .elements
            .read()
            .get_index(index)
            .map(|(_, v)| v.clone())
    }

    /// Element by key
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.elements.read().get(key).cloned()
    }

    /// Position of a key
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.0.elements.read().get_index_of(key)
    }

    /// Whether an element with that key is present
    pub fn has(&self, key: &str) -> bool {
        self.0.elements.read().contains_key(key)
    }

    /// Keys in order
    pub fn keys(&self) -> Vec<String> {
        self.0.elements.read().keys().cloned().collect()
    }
}

fn normalize_index(index: isize, len: usize) -> usize {
    if index < 0 {
        (len as isize + index).max(0) as usize
    } else {
        index as usize
    }
}

impl fmt::Debug for ListValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListValue")
            .field("type", &self.0.ty)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(-1, 3), 2);
        assert_eq!(normalize_index(-5, 3), 0);
        assert_eq!(normalize_index(7, 3), 7);
    }
}
