//! Plugin registry: a name -> factory map populated at program start (§4.1,
//! §6's `-V`). Generic over the boxed trait object a given stage kind
//! produces; the `stages` crate instantiates one `Registry<Box<dyn ...>>`
//! per stage kind (input/demuxer/decoder/filter/encoder/muxer/output).

use std::collections::BTreeMap;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Maps a plugin name to a zero-argument factory. `BTreeMap` keeps `names()`
/// sorted, matching the grouped, stable `-V` plugin listing (§6).
pub struct Registry<T> {
    kind: &'static str,
    factories: BTreeMap<&'static str, Factory<T>>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, factories: BTreeMap::new() }
    }

    pub fn register(&mut self, name: &'static str, factory: impl Fn() -> T + Send + Sync + 'static) {
        self.factories.insert(name, Box::new(factory));
    }

    /// Construct a plugin by name. Unknown names are a config-time error
    /// (§7 `ConfigError`), surfaced by the caller (who knows the stage kind
    /// and the offending section).
    pub fn create(&self, name: &str) -> Option<T> {
        self.factories.get(name).map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_is_none() {
        let r: Registry<u32> = Registry::new("decoder");
        assert!(r.create("nope").is_none());
    }

    #[test]
    fn registered_factory_is_invoked() {
        let mut r: Registry<u32> = Registry::new("decoder");
        r.register("pcm", || 42);
        assert_eq!(r.create("pcm"), Some(42));
        assert!(r.contains("pcm"));
        assert_eq!(r.names().collect::<Vec<_>>(), vec!["pcm"]);
    }
}
