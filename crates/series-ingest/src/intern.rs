//! Local caches of interned strings, mirroring the server-side `pcp:map:*`
//! hashes. Owned explicitly by the caller via [`InternRegistry`] — there is
//! no global/static map, unlike the original's process-wide `redisMapsInit`
//! tables (see `SPEC_FULL.md` §9).

use crate::model::Id;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A single named interning domain, e.g. `metric.name` or `inst.name`.
#[derive(Debug, Default)]
pub struct InternMap {
    name: String,
    entries: HashMap<Id, String>,
}

impl InternMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, id: &Id) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn insert(&mut self, id: Id, value: String) {
        self.entries.insert(id, value);
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.entries.contains_key(id)
    }
}

/// The set of interning maps a single ingest session needs: the four fixed
/// maps the schema always has, plus per-label-name value maps created on
/// first sighting of that label.
pub struct InternRegistry {
    pub context_name: Rc<RefCell<InternMap>>,
    pub metric_name: Rc<RefCell<InternMap>>,
    pub inst_name: Rc<RefCell<InternMap>>,
    pub label_name: Rc<RefCell<InternMap>>,
    label_values: RefCell<HashMap<Id, Rc<RefCell<InternMap>>>>,
}

impl Default for InternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InternRegistry {
    pub fn new() -> Self {
        Self {
            context_name: Rc::new(RefCell::new(InternMap::new("context.name"))),
            metric_name: Rc::new(RefCell::new(InternMap::new("metric.name"))),
            inst_name: Rc::new(RefCell::new(InternMap::new("inst.name"))),
            label_name: Rc::new(RefCell::new(InternMap::new("labels"))),
            label_values: RefCell::new(HashMap::new()),
        }
    }

    /// The value map for label name hash `label_name_hash`, created on
    /// first sighting and kept only for as long as the caller holds the
    /// returned handle plus this registry's own reference.
    pub fn label_value_map(&self, label_name_hash: Id) -> Rc<RefCell<InternMap>> {
        self.label_values
            .borrow_mut()
            .entry(label_name_hash)
            .or_insert_with(|| {
                let mapname = format!("label.{}.value", hex::encode(label_name_hash));
                Rc::new(RefCell::new(InternMap::new(mapname)))
            })
            .clone()
    }

    /// Release this registry's own reference to the value map for
    /// `label_name_hash`, once its mapping round has completed
    /// (`SPEC_FULL.md` §4.2/§5: "released when the associated mapping
    /// completes", unlike the four process-lived fixed maps). A caller
    /// still holding a cloned `Rc` from [`Self::label_value_map`] keeps it
    /// alive; the next sighting of this label name after release starts a
    /// fresh map rather than growing one for the life of the process.
    pub fn release_label_value_map(&self, label_name_hash: Id) {
        self.label_values.borrow_mut().remove(&label_name_hash);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use series_wire::hash;

    #[test]
    fn lookup_after_insert() {
        let mut map = InternMap::new("metric.name");
        let id = hash::hash(b"kernel.all.load");
        map.insert(id, "kernel.all.load".to_string());
        assert_eq!(map.lookup(&id), Some("kernel.all.load"));
    }

    #[test]
    fn label_value_map_is_stable_per_name() {
        let registry = InternRegistry::new();
        let name_hash = hash::hash(b"hostname");
        let a = registry.label_value_map(name_hash);
        let b = registry.label_value_map(name_hash);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn release_drops_the_registrys_own_reference() {
        let registry = InternRegistry::new();
        let name_hash = hash::hash(b"hostname");
        let a = registry.label_value_map(name_hash);
        registry.release_label_value_map(name_hash);
        let b = registry.label_value_map(name_hash);
        assert!(!Rc::ptr_eq(&a, &b), "a fresh map should replace the released one");
    }
}
